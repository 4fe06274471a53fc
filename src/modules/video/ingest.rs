use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{info, warn};

use super::model::{NewVideo, VideoAsset};
use super::status::StatusTracker;
use crate::error::VideoError;
use crate::infrastructure::storage::content_store::ContentStore;
use crate::infrastructure::transcoder::Transcoder;
use crate::workers::queue::{EnqueueError, TaskQueue, TranscodeTask};

/// Display metadata that travels with an upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMetadata {
    pub name: String,
    pub description: String,
}

/// Accepts an upload, stores it under its content hash, probes it, records a
/// `Processing` asset and hands a task to the workers.
#[derive(Clone)]
pub struct IngestService {
    store: ContentStore,
    transcoder: Arc<dyn Transcoder>,
    tracker: StatusTracker,
    queue: TaskQueue,
}

impl IngestService {
    pub fn new(store: ContentStore, transcoder: Arc<dyn Transcoder>, tracker: StatusTracker, queue: TaskQueue) -> Self {
        Self {
            store,
            transcoder,
            tracker,
            queue,
        }
    }

    /// Returns once the task is queued. Waits while the queue is full.
    pub async fn ingest<R>(
        &self,
        reader: &mut R,
        filename: &str,
        size: u64,
        metadata: UploadMetadata,
    ) -> Result<VideoAsset, VideoError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        const OP: &str = "IngestService::ingest";

        let stored = self
            .store
            .store_upload(reader, filename, size)
            .await
            .map_err(|e| VideoError::ingestion(OP, format!("storing {filename:?}: {e}")))?;

        let duration = match self.transcoder.probe_duration(&stored.source_path).await {
            Ok(duration) => duration,
            Err(e) => {
                self.discard(&stored.source_path, &stored.content_hash).await;
                return Err(VideoError::ingestion(OP, format!("probing {filename:?}: {e}")));
            }
        };

        if let Ok(existing) = self.tracker.get_by_hash(&stored.content_hash).await {
            warn!(op = OP, existing_id = existing.id, content_hash = %stored.content_hash, "content hash already in use, sharing its directory");
        }

        let asset = match self
            .tracker
            .create(NewVideo {
                name: metadata.name,
                description: metadata.description,
                content_hash: stored.content_hash.clone(),
                duration,
            })
            .await
        {
            Ok(asset) => asset,
            Err(e) => {
                self.discard(&stored.source_path, &stored.content_hash).await;
                return Err(e);
            }
        };

        let task = TranscodeTask {
            upload_dir: stored.dir,
            video_id: asset.id,
            source_path: stored.source_path,
            content_hash: stored.content_hash,
        };
        let queued = match self.queue.try_enqueue(task) {
            Ok(()) => Ok(()),
            Err(EnqueueError::Full(task)) => {
                warn!(op = OP, video_id = asset.id, capacity = self.queue.capacity(), "transcode queue full, waiting for a free slot");
                self.queue.enqueue(task).await
            }
            Err(closed) => Err(closed),
        };
        if let Err(rejected) = queued {
            warn!(op = OP, video_id = asset.id, "queue closed, video will not be transcoded");
            let task = rejected.into_task();
            self.discard(&task.source_path, &task.content_hash).await;
            if let Err(e) = self.tracker.mark_failed(asset.id).await {
                warn!(op = OP, video_id = asset.id, error = %e, "could not mark video as failed");
            }
            return Err(VideoError::QueueClosed { op: OP });
        }

        info!(op = OP, video_id = asset.id, content_hash = %asset.content_hash, duration, "upload queued for transcoding");
        Ok(asset)
    }

    /// Drops the raw file, and the hash directory when nothing else is in it.
    async fn discard(&self, source_path: &Path, content_hash: &str) {
        const OP: &str = "IngestService::discard";

        if let Err(e) = self.store.remove_file(source_path).await {
            warn!(op = OP, path = %source_path.display(), error = %e, "could not remove raw upload");
        }
        if let Err(e) = self.store.remove_dir_if_empty(content_hash).await {
            warn!(op = OP, content_hash, error = %e, "could not remove upload directory");
        }
    }
}
