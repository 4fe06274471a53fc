use thiserror::Error;

pub const UPLOAD_STATUS_TITLE: &str = "Upload Status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub asset_id: i64,
    pub title: String,
    pub message: String,
}

impl NotificationEvent {
    pub fn upload_succeeded(asset_id: i64) -> Self {
        Self {
            kind: NotificationKind::Success,
            asset_id,
            title: UPLOAD_STATUS_TITLE.to_string(),
            message: "The upload was successful.".to_string(),
        }
    }

    pub fn upload_failed(asset_id: i64) -> Self {
        Self {
            kind: NotificationKind::Failure,
            asset_id,
            title: UPLOAD_STATUS_TITLE.to_string(),
            message: "The upload has failed.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}
