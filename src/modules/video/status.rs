use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use super::model::{NewVideo, VideoAsset, VideoStatus};
use super::repository::{RepositoryError, VideoRepository};
use crate::error::VideoError;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// State machine over the video repository. Every status write goes through
/// here so that `Processing -> Processed | Failed` is the only path a row can
/// take.
#[derive(Clone)]
pub struct StatusTracker {
    repo: Arc<dyn VideoRepository>,
    retries: u32,
    base_delay: Duration,
}

impl StatusTracker {
    pub fn new(repo: Arc<dyn VideoRepository>, retries: u32) -> Self {
        Self {
            repo,
            retries,
            base_delay: RETRY_BASE_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub async fn create(&self, video: NewVideo) -> Result<VideoAsset, VideoError> {
        let asset = self
            .repo
            .create(video)
            .await
            .map_err(VideoError::persistence("StatusTracker::create"))?;

        info!(op = "StatusTracker::create", video_id = asset.id, content_hash = %asset.content_hash, "video registered");
        Ok(asset)
    }

    pub async fn mark_processed(&self, id: i64) -> Result<(), VideoError> {
        self.update_status(id, VideoStatus::Processed).await
    }

    pub async fn mark_failed(&self, id: i64) -> Result<(), VideoError> {
        self.update_status(id, VideoStatus::Failed).await
    }

    /// Moves a `Processing` asset to `to`. Anything else, including a row
    /// that already reached a terminal state, is `InvalidTransition`.
    pub async fn update_status(&self, id: i64, to: VideoStatus) -> Result<(), VideoError> {
        const OP: &str = "StatusTracker::update_status";
        let from = VideoStatus::Processing;

        if !from.can_transition_to(to) {
            return Err(VideoError::InvalidTransition { op: OP, id, from, to });
        }

        let mut attempt = 0;
        let applied = loop {
            match self.repo.update_status(id, from, to).await {
                Ok(applied) => break applied,
                Err(RepositoryError::NotFound) => {
                    return Err(VideoError::persistence(OP)(RepositoryError::NotFound));
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    warn!(op = OP, video_id = id, attempt, error = %e, "status write failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(VideoError::persistence(OP)(e)),
            }
        };

        if !applied {
            let current = self
                .repo
                .get_by_id(id)
                .await
                .map_err(VideoError::persistence(OP))?;
            return Err(VideoError::InvalidTransition {
                op: OP,
                id,
                from: current.status,
                to,
            });
        }

        info!(op = OP, video_id = id, status = %to, "status updated");
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<VideoAsset, VideoError> {
        self.repo
            .get_by_id(id)
            .await
            .map_err(VideoError::persistence("StatusTracker::get_by_id"))
    }

    pub async fn get_by_uuid(&self, uuid: Uuid) -> Result<VideoAsset, VideoError> {
        self.repo
            .get_by_uuid(uuid)
            .await
            .map_err(VideoError::persistence("StatusTracker::get_by_uuid"))
    }

    /// Like `get_by_uuid`, but anything not ready for playback reads as missing.
    pub async fn get_playable_by_uuid(&self, uuid: Uuid) -> Result<VideoAsset, VideoError> {
        let asset = self.get_by_uuid(uuid).await?;
        if !asset.is_playable() {
            return Err(VideoError::not_found(
                "StatusTracker::get_playable_by_uuid",
                uuid.to_string(),
            ));
        }
        Ok(asset)
    }

    pub async fn get_by_hash(&self, content_hash: &str) -> Result<VideoAsset, VideoError> {
        self.repo
            .get_by_hash(content_hash)
            .await
            .map_err(VideoError::persistence("StatusTracker::get_by_hash"))
    }

    pub async fn list(&self, status: Option<VideoStatus>) -> Result<Vec<VideoAsset>, VideoError> {
        self.repo
            .list(status)
            .await
            .map_err(VideoError::persistence("StatusTracker::list"))
    }

    pub async fn update_info(
        &self,
        id: i64,
        name: &str,
        description: &str,
    ) -> Result<VideoAsset, VideoError> {
        self.repo
            .update_info(id, name, description)
            .await
            .map_err(VideoError::persistence("StatusTracker::update_info"))
    }

    pub async fn soft_delete(&self, id: i64) -> Result<(), VideoError> {
        self.repo
            .soft_delete(id)
            .await
            .map_err(VideoError::persistence("StatusTracker::soft_delete"))
    }

    pub async fn delete(&self, id: i64) -> Result<(), VideoError> {
        self.repo
            .delete(id)
            .await
            .map_err(VideoError::persistence("StatusTracker::delete"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::repository::MockVideoRepository;

    fn new_video() -> NewVideo {
        NewVideo {
            name: "clip".to_string(),
            description: String::new(),
            content_hash: "abc".to_string(),
            duration: 3.0,
        }
    }

    fn tracker() -> StatusTracker {
        StatusTracker::new(Arc::new(InMemoryVideoRepository::new()), 0)
    }

    #[tokio::test]
    async fn terminal_status_never_reverts() {
        let tracker = tracker();
        let asset = tracker.create(new_video()).await.unwrap();

        tracker.mark_processed(asset.id).await.unwrap();

        let err = tracker.mark_failed(asset.id).await.unwrap_err();
        assert!(matches!(
            err,
            VideoError::InvalidTransition {
                from: VideoStatus::Processed,
                to: VideoStatus::Failed,
                ..
            }
        ));
        let err = tracker
            .update_status(asset.id, VideoStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::InvalidTransition { .. }));

        assert_eq!(tracker.get_by_id(asset.id).await.unwrap().status, VideoStatus::Processed);
    }

    #[tokio::test]
    async fn only_processed_and_enabled_assets_are_playable() {
        let tracker = tracker();
        let processing = tracker.create(new_video()).await.unwrap();
        assert!(tracker.get_playable_by_uuid(processing.uuid).await.unwrap_err().is_not_found());

        tracker.mark_processed(processing.id).await.unwrap();
        assert!(tracker.get_playable_by_uuid(processing.uuid).await.is_ok());

        tracker.soft_delete(processing.id).await.unwrap();
        assert!(tracker.get_playable_by_uuid(processing.uuid).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn persistence_failure_is_not_retried_by_default() {
        let mut repo = MockVideoRepository::new();
        repo.expect_update_status()
            .times(1)
            .returning(|_, _, _| Err(RepositoryError::Corrupt("disk full".to_string())));

        let tracker = StatusTracker::new(Arc::new(repo), 0);
        let err = tracker.mark_processed(7).await.unwrap_err();
        assert!(matches!(err, VideoError::Persistence { .. }));
    }

    #[tokio::test]
    async fn retries_with_backoff_when_configured() {
        let mut repo = MockVideoRepository::new();
        let mut calls = 0;
        repo.expect_update_status().times(3).returning(move |_, _, _| {
            calls += 1;
            if calls < 3 {
                Err(RepositoryError::Corrupt("connection reset".to_string()))
            } else {
                Ok(true)
            }
        });

        let tracker = StatusTracker::new(Arc::new(repo), 2).with_base_delay(Duration::from_millis(1));
        tracker.mark_failed(7).await.unwrap();
    }

    #[tokio::test]
    async fn missing_row_is_not_retried() {
        let mut repo = MockVideoRepository::new();
        repo.expect_update_status()
            .times(1)
            .returning(|_, _, _| Err(RepositoryError::NotFound));

        let tracker = StatusTracker::new(Arc::new(repo), 3);
        assert!(tracker.mark_failed(7).await.unwrap_err().is_not_found());
    }
}
