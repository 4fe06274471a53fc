use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::ingest::UploadMetadata;
use super::model::{VideoAsset, VideoStatus};

/// Text fields of the upload form. The file itself is streamed separately.
#[derive(Debug, Default, Validate)]
pub struct UploadForm {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: String,
}

impl From<UploadForm> for UploadMetadata {
    fn from(form: UploadForm) -> Self {
        Self {
            name: form.name,
            description: form.description,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateVideoRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 4096, message = "Description must be at most 4096 characters"))]
    pub description: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListVideosQuery {
    /// processing, processed or failed
    pub status: Option<VideoStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoResponse {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub status: VideoStatus,
    pub duration: f64,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl From<VideoAsset> for VideoResponse {
    fn from(v: VideoAsset) -> Self {
        Self {
            uuid: v.uuid,
            name: v.name,
            description: v.description,
            status: v.status,
            duration: v.duration,
            created_at: v.created_at,
            updated_at: v.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub id: i64,
    pub uuid: Uuid,
    pub content_hash: String,
    pub status: VideoStatus,
}

impl From<VideoAsset> for UploadResponse {
    fn from(v: VideoAsset) -> Self {
        Self {
            id: v.id,
            uuid: v.uuid,
            content_hash: v.content_hash,
            status: v.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_form_limits() {
        let ok = UploadForm {
            name: "clip".to_string(),
            description: String::new(),
        };
        assert!(ok.validate().is_ok());

        let empty = UploadForm::default();
        assert!(empty.validate().is_err());

        let long = UploadForm {
            name: "n".repeat(256),
            description: String::new(),
        };
        assert!(long.validate().is_err());

        let verbose = UploadForm {
            name: "clip".to_string(),
            description: "d".repeat(4097),
        };
        assert!(verbose.validate().is_err());
    }
}
