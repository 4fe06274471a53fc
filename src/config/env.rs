use std::env;
use std::str::FromStr;

use super::settings::ConfigError;

#[derive(Debug, Clone, Copy)]
pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    StoragePath,
    VideoPath,
    WorkerCount,
    QueueCapacity,
    Resolutions,
    FfmpegBin,
    FfprobeBin,
    HlsSegmentSeconds,
    ContentHashMode,
    MasterPlaylistMode,
    StatusUpdateRetries,
    MaxUploadBytes,
    NotificationBuffer,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::StoragePath => "STORAGE_PATH",
            EnvKey::VideoPath => "VIDEO_PATH",
            EnvKey::WorkerCount => "TRANSCODE_WORKER_COUNT",
            EnvKey::QueueCapacity => "TRANSCODE_QUEUE_CAPACITY",
            EnvKey::Resolutions => "RESOLUTIONS",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::FfprobeBin => "FFPROBE_BIN",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
            EnvKey::ContentHashMode => "CONTENT_HASH_MODE",
            EnvKey::MasterPlaylistMode => "MASTER_PLAYLIST_MODE",
            EnvKey::StatusUpdateRetries => "STATUS_UPDATE_RETRIES",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::NotificationBuffer => "NOTIFICATION_BUFFER",
        }
    }
}

/// Source of raw configuration values. The process environment in production,
/// a map in tests.
pub trait EnvSource {
    fn lookup(&self, key: EnvKey) -> Option<String>;

    fn get_or(&self, key: EnvKey, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }

    fn get_parsed<T: FromStr>(&self, key: EnvKey, default: T) -> Result<T, ConfigError> {
        match self.lookup(key) {
            Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
                key: key.as_str(),
                value: raw,
            }),
            None => Ok(default),
        }
    }
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn lookup(&self, key: EnvKey) -> Option<String> {
        env::var(key.as_str()).ok().filter(|v| !v.is_empty())
    }
}
