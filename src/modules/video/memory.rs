use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{NewVideo, VideoAsset, VideoStatus};
use super::repository::{RepoResult, RepositoryError, VideoRepository};

/// Process-local repository, used when no database is configured. Contents
/// are lost on restart.
#[derive(Default)]
pub struct InMemoryVideoRepository {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    videos: BTreeMap<i64, VideoAsset>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create(&self, video: NewVideo) -> RepoResult<VideoAsset> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        let now = OffsetDateTime::now_utc();
        let asset = VideoAsset {
            id: inner.next_id,
            uuid: Uuid::new_v4(),
            name: video.name,
            description: video.description,
            content_hash: video.content_hash,
            status: VideoStatus::Processing,
            duration: video.duration,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.videos.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn update_status(&self, id: i64, from: VideoStatus, to: VideoStatus) -> RepoResult<bool> {
        let mut inner = self.inner.write().await;
        let video = inner.videos.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        if video.status != from {
            return Ok(false);
        }
        video.status = to;
        video.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<VideoAsset> {
        let inner = self.inner.read().await;
        inner.videos.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> RepoResult<VideoAsset> {
        let inner = self.inner.read().await;
        inner
            .videos
            .values()
            .find(|v| v.uuid == uuid)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_hash(&self, content_hash: &str) -> RepoResult<VideoAsset> {
        let inner = self.inner.read().await;
        inner
            .videos
            .values()
            .rev()
            .find(|v| v.content_hash == content_hash)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, status: Option<VideoStatus>) -> RepoResult<Vec<VideoAsset>> {
        let inner = self.inner.read().await;
        Ok(inner
            .videos
            .values()
            .rev()
            .filter(|v| !v.is_disabled())
            .filter(|v| status.is_none_or(|s| v.status == s))
            .cloned()
            .collect())
    }

    async fn update_info(&self, id: i64, name: &str, description: &str) -> RepoResult<VideoAsset> {
        let mut inner = self.inner.write().await;
        let video = inner.videos.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        video.name = name.to_string();
        video.description = description.to_string();
        video.updated_at = OffsetDateTime::now_utc();
        Ok(video.clone())
    }

    async fn soft_delete(&self, id: i64) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let video = inner.videos.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let now = OffsetDateTime::now_utc();
        video.deleted_at = Some(now);
        video.updated_at = now;
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .videos
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
