use std::ffi::OsString;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{TranscodeError, Transcoder};
use crate::config::settings::{AppConfig, Resolution};

/// ffprobe/ffmpeg invoked as child processes.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    segment_seconds: u32,
}

impl FfmpegTranscoder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            segment_seconds: config.hls_segment_seconds,
        }
    }

    async fn run(&self, program: &str, args: Vec<OsString>) -> Result<Output, TranscodeError> {
        debug!(program, ?args, "spawning");

        let output = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Exit {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn probe_args(source: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(source.as_os_str().to_owned());
    args
}

fn encode_args(source: &Path, resolution: &Resolution, out_dir: &Path, segment_seconds: u32) -> Vec<OsString> {
    let segment_template = out_dir.join(format!("{}_%03d.ts", resolution.label));
    let playlist = out_dir.join(resolution.playlist_name());

    vec![
        "-y".into(),
        "-i".into(),
        source.as_os_str().to_owned(),
        "-profile:v".into(),
        "baseline".into(),
        "-level".into(),
        "3.0".into(),
        "-s".into(),
        resolution.size().into(),
        "-start_number".into(),
        "0".into(),
        "-hls_time".into(),
        segment_seconds.to_string().into(),
        "-hls_list_size".into(),
        "0".into(),
        "-f".into(),
        "hls".into(),
        "-hls_segment_filename".into(),
        segment_template.into_os_string(),
        playlist.into_os_string(),
    ]
}

/// ffprobe prints the container duration as a bare float.
pub fn parse_duration(stdout: &[u8]) -> Result<f64, TranscodeError> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();

    match trimmed.parse::<f64>() {
        Ok(duration) if duration.is_finite() && duration >= 0.0 => Ok(duration),
        _ => Err(TranscodeError::ProbeOutput(trimmed.to_string())),
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_duration(&self, source: &Path) -> Result<f64, TranscodeError> {
        let output = self.run(&self.ffprobe_bin, probe_args(source)).await?;
        parse_duration(&output.stdout)
    }

    async fn encode_variant(
        &self,
        source: &Path,
        resolution: &Resolution,
        out_dir: &Path,
    ) -> Result<(), TranscodeError> {
        let args = encode_args(source, resolution, out_dir, self.segment_seconds);
        self.run(&self.ffmpeg_bin, args).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::testing::test_config;

    #[test]
    fn parses_probe_output() {
        assert_eq!(parse_duration(b"12.500000\n").unwrap(), 12.5);
        assert!(matches!(parse_duration(b"N/A\n"), Err(TranscodeError::ProbeOutput(_))));
        assert!(parse_duration(b"").is_err());
        assert!(parse_duration(b"-3").is_err());
    }

    #[test]
    fn encode_arguments_name_outputs_by_label() {
        let args = encode_args(
            Path::new("/in/sample.mp4"),
            &Resolution::new(640, 360, "360"),
            Path::new("/out/abc"),
            10,
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let after = |flag: &str| {
            let at = args.iter().position(|a| a == flag).unwrap();
            args[at + 1].clone()
        };
        assert_eq!(after("-s"), "640x360");
        assert_eq!(after("-hls_time"), "10");
        assert_eq!(after("-hls_segment_filename"), "/out/abc/360_%03d.ts");
        assert_eq!(args.last().unwrap(), "/out/abc/360.m3u8");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.ffprobe_bin = dir.path().join("no-such-ffprobe").display().to_string();

        let err = FfmpegTranscoder::new(&config)
            .probe_duration(Path::new("sample.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}
