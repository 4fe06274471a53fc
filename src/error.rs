use std::fmt::Display;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::common::response::ApiError;
use crate::infrastructure::transcoder::TranscodeError;
use crate::modules::video::model::VideoStatus;
use crate::modules::video::repository::RepositoryError;

/// Failures of the ingest -> transcode -> playback pipeline. Every variant
/// carries the operation tag of the call that produced it.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("{op}: ingestion failed: {reason}")]
    Ingestion { op: &'static str, reason: String },

    #[error("{op}: encoding {resolution} failed: {source}")]
    Encode {
        op: &'static str,
        resolution: String,
        #[source]
        source: TranscodeError,
    },

    #[error("{op}: persistence failed: {source}")]
    Persistence {
        op: &'static str,
        #[source]
        source: RepositoryError,
    },

    #[error("{op}: nothing to serve for {path:?}")]
    ResolutionNotFound { op: &'static str, path: String },

    #[error("{op}: video {id} cannot move from {from} to {to}")]
    InvalidTransition {
        op: &'static str,
        id: i64,
        from: VideoStatus,
        to: VideoStatus,
    },

    #[error("{op}: storage error at {}: {source}", .path.display())]
    Storage {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op}: transcode queue is closed")]
    QueueClosed { op: &'static str },
}

impl VideoError {
    pub fn ingestion(op: &'static str, reason: impl Display) -> Self {
        VideoError::Ingestion {
            op,
            reason: reason.to_string(),
        }
    }

    pub fn persistence(op: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |source| VideoError::Persistence { op, source }
    }

    pub fn storage(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| VideoError::Storage { op, path, source }
    }

    pub fn not_found(op: &'static str, path: impl Into<String>) -> Self {
        VideoError::ResolutionNotFound {
            op,
            path: path.into(),
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            VideoError::Ingestion { op, .. }
            | VideoError::Encode { op, .. }
            | VideoError::Persistence { op, .. }
            | VideoError::ResolutionNotFound { op, .. }
            | VideoError::InvalidTransition { op, .. }
            | VideoError::Storage { op, .. }
            | VideoError::QueueClosed { op } => *op,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VideoError::ResolutionNotFound { .. }
                | VideoError::Persistence {
                    source: RepositoryError::NotFound,
                    ..
                }
        )
    }
}

impl From<VideoError> for ApiError {
    fn from(err: VideoError) -> Self {
        tracing::error!(op = err.op(), error = %err, "request failed");
        if err.is_not_found() {
            ApiError::not_found()
        } else {
            ApiError::internal()
        }
    }
}
