use std::fmt::Write;
use std::io;
use std::path::Path;

use crate::config::settings::{MasterPlaylistMode, Resolution};

pub const MASTER_PLAYLIST: &str = "playlist.m3u8";

/// The rendition ladder older clients were built against.
const LEGACY_LADDER: [(u64, u32, u32, &str); 4] = [
    (800_000, 640, 360, "360"),
    (1_400_000, 854, 480, "480"),
    (2_800_000, 1280, 720, "720"),
    (5_000_000, 1920, 1080, "1080"),
];

/// One encoded rendition as it will be announced in the master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    pub resolution: Resolution,
    pub bandwidth: u64,
}

/// Bandwidth from the legacy ladder for the nearest height at or above this one.
pub fn nominal_bandwidth(height: u32) -> u64 {
    LEGACY_LADDER
        .iter()
        .find(|(_, _, h, _)| height <= *h)
        .map(|(bw, ..)| *bw)
        .unwrap_or(LEGACY_LADDER[3].0)
}

/// Bits per second of the `{label}_*.ts` segments in `dir`, or `None` when
/// nothing usable was written.
pub async fn measure_bandwidth(dir: &Path, label: &str, duration: f64) -> io::Result<Option<u64>> {
    if duration <= 0.0 {
        return Ok(None);
    }

    let prefix = format!("{label}_");
    let mut bytes = 0u64;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".ts") {
            bytes += entry.metadata().await?.len();
        }
    }

    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some((bytes as f64 * 8.0 / duration).round() as u64))
}

/// Measured renditions for `resolutions`, falling back to the nominal
/// bandwidth when a rendition cannot be measured.
pub async fn measure_renditions(dir: &Path, resolutions: &[Resolution], duration: f64) -> io::Result<Vec<Rendition>> {
    let mut renditions = Vec::with_capacity(resolutions.len());
    for resolution in resolutions {
        let bandwidth = measure_bandwidth(dir, &resolution.label, duration)
            .await?
            .unwrap_or_else(|| nominal_bandwidth(resolution.height));
        renditions.push(Rendition {
            resolution: resolution.clone(),
            bandwidth,
        });
    }
    Ok(renditions)
}

/// Master playlist body. Entry URIs are `{content_hash}/{label}.m3u8`, which
/// resolves against the `/videos/{uuid}` URL the master is served from.
pub fn render_master(mode: MasterPlaylistMode, content_hash: &str, renditions: &[Rendition]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");

    let entries: Vec<Rendition> = match mode {
        MasterPlaylistMode::Fixed => LEGACY_LADDER
            .iter()
            .map(|(bandwidth, width, height, label)| Rendition {
                resolution: Resolution::new(*width, *height, *label),
                bandwidth: *bandwidth,
            })
            .collect(),
        MasterPlaylistMode::Derived => renditions.to_vec(),
    };

    for entry in entries {
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            entry.bandwidth,
            entry.resolution.size()
        );
        let _ = writeln!(out, "{}/{}", content_hash, entry.resolution.playlist_name());
    }
    out
}
