use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::config::env::{EnvKey, EnvSource};

const DEFAULT_RESOLUTIONS: &str = "640x360:360,854x480:480,1280x720:720,1920x1080:1080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("invalid resolution entry {0:?}, expected WIDTHxHEIGHT:label")]
    Resolution(String),

    #[error("RESOLUTIONS must name at least one rendition")]
    NoResolutions,
}

/// One configured rendition, e.g. `640x360:360`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl Resolution {
    pub fn new(width: u32, height: u32, label: impl Into<String>) -> Self {
        Self {
            width,
            height,
            label: label.into(),
        }
    }

    /// `WIDTHxHEIGHT`, the form the encoder expects.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.label)
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Resolution(entry.to_string());

        let (size, label) = entry.trim().split_once(':').ok_or_else(invalid)?;
        let (width, height) = size.split_once('x').ok_or_else(invalid)?;
        let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = height.trim().parse::<u32>().map_err(|_| invalid())?;
        let label = label.trim();

        if width == 0 || height == 0 || label.is_empty() || label.contains(['/', '\\', '.']) {
            return Err(invalid());
        }

        Ok(Resolution::new(width, height, label))
    }
}

pub fn parse_resolutions(raw: &str) -> Result<Vec<Resolution>, ConfigError> {
    let resolutions = raw
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Resolution>, _>>()?;

    if resolutions.is_empty() {
        return Err(ConfigError::NoResolutions);
    }
    Ok(resolutions)
}

/// How the storage directory key of an upload is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHashMode {
    /// sha256 over `"{filename}-{size}"`. Distinct files with the same name
    /// and size share a directory.
    Metadata,
    /// sha256 over the uploaded bytes, computed while copying.
    Digest,
}

impl FromStr for ContentHashMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metadata" => Ok(ContentHashMode::Metadata),
            "digest" => Ok(ContentHashMode::Digest),
            _ => Err(ConfigError::Invalid {
                key: EnvKey::ContentHashMode.as_str(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterPlaylistMode {
    /// One entry per rendition actually encoded, bandwidth measured from output.
    Derived,
    /// The legacy playlist: 360p/480p/720p/1080p at nominal bandwidths,
    /// whatever was configured.
    Fixed,
}

impl FromStr for MasterPlaylistMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "derived" => Ok(MasterPlaylistMode::Derived),
            "fixed" => Ok(MasterPlaylistMode::Fixed),
            _ => Err(ConfigError::Invalid {
                key: EnvKey::MasterPlaylistMode.as_str(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub storage_path: PathBuf,
    pub video_path: String,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub resolutions: Vec<Resolution>,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub hls_segment_seconds: u32,
    pub content_hash_mode: ContentHashMode,
    pub master_playlist_mode: MasterPlaylistMode,
    pub status_update_retries: u32,
    pub max_upload_bytes: usize,
    pub notification_buffer: usize,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(&crate::config::env::ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: env.get_parsed(EnvKey::ServerPort, 3000)?,
            database_url: env.lookup(EnvKey::DatabaseUrl),
            storage_path: PathBuf::from(env.get_or(EnvKey::StoragePath, "./storage")),
            video_path: env.get_or(EnvKey::VideoPath, "videos"),
            worker_count: env.get_parsed(EnvKey::WorkerCount, 1usize)?.max(1),
            queue_capacity: env.get_parsed(EnvKey::QueueCapacity, 50usize)?.max(1),
            resolutions: parse_resolutions(&env.get_or(EnvKey::Resolutions, DEFAULT_RESOLUTIONS))?,
            ffmpeg_bin: env.get_or(EnvKey::FfmpegBin, "ffmpeg"),
            ffprobe_bin: env.get_or(EnvKey::FfprobeBin, "ffprobe"),
            hls_segment_seconds: env.get_parsed(EnvKey::HlsSegmentSeconds, 10)?,
            content_hash_mode: env.get_parsed(EnvKey::ContentHashMode, ContentHashMode::Metadata)?,
            master_playlist_mode: env
                .get_parsed(EnvKey::MasterPlaylistMode, MasterPlaylistMode::Fixed)?,
            status_update_retries: env.get_parsed(EnvKey::StatusUpdateRetries, 0)?,
            max_upload_bytes: env.get_parsed(EnvKey::MaxUploadBytes, 8usize << 30)?,
            notification_buffer: env.get_parsed(EnvKey::NotificationBuffer, 256usize)?.max(1),
        })
    }

    /// `{storage_path}/{video_path}`, the parent of every content-hash directory.
    pub fn video_root(&self) -> PathBuf {
        self.storage_path.join(&self.video_path)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    pub struct MapEnv(pub HashMap<&'static str, String>);

    impl EnvSource for MapEnv {
        fn lookup(&self, key: EnvKey) -> Option<String> {
            self.0.get(key.as_str()).cloned()
        }
    }

    /// Config rooted at `root` with the two renditions used across the tests.
    pub fn test_config(root: &Path) -> AppConfig {
        let env = MapEnv(HashMap::from([
            ("STORAGE_PATH", root.display().to_string()),
            ("RESOLUTIONS", "854x480:480,640x360:360".to_string()),
        ]));
        AppConfig::from_source(&env).expect("test config")
    }
}
