use tracing::{error, info};
use uuid::Uuid;

use super::model::{VideoAsset, VideoStatus};
use super::status::StatusTracker;
use crate::error::VideoError;
use crate::infrastructure::storage::content_store::ContentStore;

/// Catalogue operations outside the transcode pipeline.
#[derive(Clone)]
pub struct VideoService {
    store: ContentStore,
    tracker: StatusTracker,
}

impl VideoService {
    pub fn new(store: ContentStore, tracker: StatusTracker) -> Self {
        Self { store, tracker }
    }

    pub async fn list(&self, status: Option<VideoStatus>) -> Result<Vec<VideoAsset>, VideoError> {
        self.tracker.list(status).await
    }

    pub async fn get(&self, uuid: Uuid) -> Result<VideoAsset, VideoError> {
        self.tracker.get_by_uuid(uuid).await
    }

    pub async fn update_info(&self, uuid: Uuid, name: &str, description: &str) -> Result<VideoAsset, VideoError> {
        let video = self.get(uuid).await?;
        self.tracker.update_info(video.id, name, description).await
    }

    /// Hides the video from listings and playback. Files stay on disk.
    pub async fn soft_delete(&self, uuid: Uuid) -> Result<(), VideoError> {
        let video = self.get(uuid).await?;
        self.tracker.soft_delete(video.id).await?;

        info!(op = "VideoService::soft_delete", video_id = video.id, "video disabled");
        Ok(())
    }

    /// Removes the rendition directory, then the row. The row survives when
    /// the directory cannot be removed.
    pub async fn hard_delete(&self, uuid: Uuid) -> Result<(), VideoError> {
        const OP: &str = "VideoService::hard_delete";

        let video = self.get(uuid).await?;
        let dir = self.store.root().join(&video.content_hash);

        if let Err(e) = self.store.remove_dir(&video.content_hash).await {
            error!(op = OP, video_id = video.id, path = %dir.display(), error = %e, "failed to remove video folder");
            return Err(VideoError::storage(OP, dir)(e));
        }
        self.tracker.delete(video.id).await?;

        info!(op = OP, video_id = video.id, content_hash = %video.content_hash, "video deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ContentHashMode;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::NewVideo;
    use std::sync::Arc;

    async fn setup(root: &std::path::Path, hash: &str) -> (VideoService, VideoAsset) {
        let tracker = StatusTracker::new(Arc::new(InMemoryVideoRepository::new()), 0);
        let service = VideoService::new(ContentStore::new(root, ContentHashMode::Metadata), tracker.clone());
        let asset = tracker
            .create(NewVideo {
                name: "old".to_string(),
                description: String::new(),
                content_hash: hash.to_string(),
                duration: 2.0,
            })
            .await
            .unwrap();
        (service, asset)
    }

    #[tokio::test]
    async fn hard_delete_removes_files_then_row() {
        let root = tempfile::tempdir().unwrap();
        let (service, asset) = setup(root.path(), "abc").await;
        std::fs::create_dir_all(root.path().join("abc")).unwrap();
        std::fs::write(root.path().join("abc/360.m3u8"), "#EXTM3U\n").unwrap();

        service.hard_delete(asset.uuid).await.unwrap();

        assert!(!root.path().join("abc").exists());
        assert!(service.get(asset.uuid).await.unwrap_err().is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn row_survives_when_the_directory_cannot_be_removed() {
        let root = tempfile::tempdir().unwrap();
        // A file where the directory should be makes remove_dir_all fail.
        std::fs::write(root.path().join("abc"), "not a directory").unwrap();
        let (service, asset) = setup(root.path(), "abc").await;

        let err = service.hard_delete(asset.uuid).await.unwrap_err();

        assert!(matches!(err, VideoError::Storage { .. }));
        assert!(service.get(asset.uuid).await.is_ok());
    }

    #[tokio::test]
    async fn soft_delete_hides_from_listing() {
        let root = tempfile::tempdir().unwrap();
        let (service, asset) = setup(root.path(), "abc").await;

        let updated = service.update_info(asset.uuid, "new", "described").await.unwrap();
        assert_eq!(updated.name, "new");

        service.soft_delete(asset.uuid).await.unwrap();
        assert!(service.list(None).await.unwrap().is_empty());
        assert!(service.get(asset.uuid).await.unwrap().is_disabled());
    }

    #[tokio::test]
    async fn mutations_on_an_unknown_video_are_not_found() {
        let root = tempfile::tempdir().unwrap();
        let (service, _) = setup(root.path(), "abc").await;
        std::fs::create_dir_all(root.path().join("abc")).unwrap();
        let missing = Uuid::new_v4();

        assert!(service.update_info(missing, "n", "d").await.unwrap_err().is_not_found());
        assert!(service.soft_delete(missing).await.unwrap_err().is_not_found());
        assert!(service.hard_delete(missing).await.unwrap_err().is_not_found());
        assert!(root.path().join("abc").exists());
        assert_eq!(service.list(None).await.unwrap().len(), 1);
    }
}
