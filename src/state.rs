use std::path::PathBuf;
use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::modules::notification::NotificationDispatcher;
use crate::modules::video::ingest::IngestService;
use crate::modules::video::playback::PlaybackResolver;
use crate::modules::video::service::VideoService;
use crate::workers::queue::TaskQueue;

const UPLOAD_STAGING_DIR: &str = ".uploads";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ingest: IngestService,
    pub resolver: PlaybackResolver,
    pub videos: VideoService,
    pub queue: TaskQueue,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        ingest: IngestService,
        resolver: PlaybackResolver,
        videos: VideoService,
        queue: TaskQueue,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            config,
            ingest,
            resolver,
            videos,
            queue,
            notifier,
        }
    }

    /// Where multipart uploads are spooled before ingestion.
    pub fn staging_dir(&self) -> PathBuf {
        self.config.storage_path.join(UPLOAD_STAGING_DIR)
    }
}
