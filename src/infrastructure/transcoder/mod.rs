use std::io;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::settings::Resolution;

pub mod ffmpeg;
pub mod playlist;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unparsable probe output {0:?}")]
    ProbeOutput(String),
}

/// The two external tools the pipeline drives. Both calls run to completion;
/// there is no timeout.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Media duration in seconds.
    async fn probe_duration(&self, source: &Path) -> Result<f64, TranscodeError>;

    /// Writes `{label}.m3u8` and `{label}_NNN.ts` for one rendition into `out_dir`.
    async fn encode_variant(
        &self,
        source: &Path,
        resolution: &Resolution,
        out_dir: &Path,
    ) -> Result<(), TranscodeError>;
}
