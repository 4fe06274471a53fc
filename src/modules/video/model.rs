use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of one ingestion attempt. `Processing` is the only non-terminal
/// state; there is no way back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Processing,
    Processed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Processing, VideoStatus::Processed)
                | (VideoStatus::Processing, VideoStatus::Failed)
        )
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown video status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for VideoStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(VideoStatus::Processing),
            "processed" => Ok(VideoStatus::Processed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VideoAsset {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    /// Storage directory key, set once at ingestion.
    pub content_hash: String,
    pub status: VideoStatus,
    pub duration: f64,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub deleted_at: Option<OffsetDateTime>,
}

impl VideoAsset {
    /// Soft-deleted. Independent of `status`.
    pub fn is_disabled(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_playable(&self) -> bool {
        self.status == VideoStatus::Processed && !self.is_disabled()
    }
}

/// Everything ingestion knows about an asset before storage assigns its ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub name: String,
    pub description: String,
    pub content_hash: String,
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_processing_moves_forward() {
        use VideoStatus::*;

        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Failed));

        for terminal in [Processed, Failed] {
            for next in [Processing, Processed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn status_text_round_trips() {
        for status in [VideoStatus::Processing, VideoStatus::Processed, VideoStatus::Failed] {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), status);
        }
        let err = "disabled".parse::<VideoStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown video status \"disabled\"");
    }
}
