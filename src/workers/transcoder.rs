use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::settings::{AppConfig, MasterPlaylistMode, Resolution};
use crate::error::VideoError;
use crate::infrastructure::storage::content_store::ContentStore;
use crate::infrastructure::transcoder::Transcoder;
use crate::infrastructure::transcoder::playlist::{self, MASTER_PLAYLIST};
use crate::modules::notification::{NotificationDispatcher, NotificationEvent};
use crate::modules::video::status::StatusTracker;
use crate::workers::pool::TaskRunner;
use crate::workers::queue::TranscodeTask;

/// Runs one task from raw upload to a finished rendition set:
/// every resolution in ascending height, then the master playlist, then
/// `Processed`. Any failure marks the asset `Failed` and removes the whole
/// working directory.
pub struct TranscodePipeline {
    store: ContentStore,
    transcoder: Arc<dyn Transcoder>,
    tracker: StatusTracker,
    notifier: NotificationDispatcher,
    resolutions: Vec<Resolution>,
    master_mode: MasterPlaylistMode,
}

impl TranscodePipeline {
    pub fn new(
        config: &AppConfig,
        store: ContentStore,
        transcoder: Arc<dyn Transcoder>,
        tracker: StatusTracker,
        notifier: NotificationDispatcher,
    ) -> Self {
        let mut resolutions = config.resolutions.clone();
        resolutions.sort_by_key(|r| r.height);

        Self {
            store,
            transcoder,
            tracker,
            notifier,
            resolutions,
            master_mode: config.master_playlist_mode,
        }
    }

    pub async fn process(&self, task: &TranscodeTask) -> Result<(), VideoError> {
        const OP: &str = "TranscodePipeline::process";
        info!(op = OP, video_id = task.video_id, content_hash = %task.content_hash, "transcode started");

        if let Err(e) = self.finish(task).await {
            self.fail(task).await;
            return Err(e);
        }

        if let Err(e) = self.store.remove_file(&task.source_path).await {
            warn!(op = OP, video_id = task.video_id, path = %task.source_path.display(), error = %e, "could not remove raw upload");
        }
        self.notifier.dispatch(NotificationEvent::upload_succeeded(task.video_id));

        info!(op = OP, video_id = task.video_id, content_hash = %task.content_hash, "transcode finished");
        Ok(())
    }

    async fn finish(&self, task: &TranscodeTask) -> Result<(), VideoError> {
        const OP: &str = "TranscodePipeline::finish";

        for resolution in &self.resolutions {
            self.transcoder
                .encode_variant(&task.source_path, resolution, &task.upload_dir)
                .await
                .map_err(|source| VideoError::Encode {
                    op: OP,
                    resolution: resolution.label.clone(),
                    source,
                })?;
            info!(op = OP, video_id = task.video_id, resolution = %resolution.label, "rendition encoded");
        }

        self.write_master(task).await?;
        self.tracker.mark_processed(task.video_id).await
    }

    async fn write_master(&self, task: &TranscodeTask) -> Result<(), VideoError> {
        const OP: &str = "TranscodePipeline::write_master";

        let renditions = match self.master_mode {
            MasterPlaylistMode::Fixed => Vec::new(),
            MasterPlaylistMode::Derived => {
                let duration = match self.tracker.get_by_id(task.video_id).await {
                    Ok(asset) => asset.duration,
                    Err(e) => {
                        warn!(op = OP, video_id = task.video_id, error = %e, "duration unknown, using nominal bandwidth");
                        0.0
                    }
                };
                playlist::measure_renditions(&task.upload_dir, &self.resolutions, duration)
                    .await
                    .map_err(VideoError::storage(OP, &task.upload_dir))?
            }
        };

        let body = playlist::render_master(self.master_mode, &task.content_hash, &renditions);
        self.store
            .write(&task.content_hash, MASTER_PLAYLIST, body.as_bytes())
            .await
            .map_err(VideoError::storage(OP, task.upload_dir.join(MASTER_PLAYLIST)))
    }

    /// Best effort: every step runs even when an earlier one fails.
    async fn fail(&self, task: &TranscodeTask) {
        const OP: &str = "TranscodePipeline::fail";

        if let Err(e) = self.tracker.mark_failed(task.video_id).await {
            error!(op = OP, video_id = task.video_id, error = %e, "could not mark video as failed");
        }
        if let Err(e) = self.store.remove_dir(&task.content_hash).await {
            error!(op = OP, video_id = task.video_id, path = %task.upload_dir.display(), error = %e, "could not remove working directory");
        }
        self.notifier.dispatch(NotificationEvent::upload_failed(task.video_id));
    }
}

#[async_trait]
impl TaskRunner for TranscodePipeline {
    async fn run(&self, task: TranscodeTask) -> Result<(), VideoError> {
        self.process(&task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::testing::test_config;
    use crate::infrastructure::transcoder::fake::FakeTranscoder;
    use crate::modules::notification::dispatcher::testing::RecordingSink;
    use crate::modules::notification::model::NotificationKind;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::{NewVideo, VideoStatus};

    struct Fixture {
        _root: tempfile::TempDir,
        config: AppConfig,
        store: ContentStore,
        tracker: StatusTracker,
        sink: Arc<RecordingSink>,
        notifier: NotificationDispatcher,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let sink = Arc::new(RecordingSink::default());
        Fixture {
            store: ContentStore::from_config(&config),
            tracker: StatusTracker::new(Arc::new(InMemoryVideoRepository::new()), 0),
            notifier: NotificationDispatcher::start(sink.clone(), 16),
            sink,
            config,
            _root: root,
        }
    }

    impl Fixture {
        fn pipeline(&self, transcoder: Arc<FakeTranscoder>) -> TranscodePipeline {
            TranscodePipeline::new(
                &self.config,
                self.store.clone(),
                transcoder,
                self.tracker.clone(),
                self.notifier.clone(),
            )
        }

        async fn task(&self) -> TranscodeTask {
            let stored = self
                .store
                .store_upload(&mut &b"raw video"[..], "sample.mp4", 9)
                .await
                .unwrap();
            let asset = self
                .tracker
                .create(NewVideo {
                    name: "sample".to_string(),
                    description: String::new(),
                    content_hash: stored.content_hash.clone(),
                    duration: 12.5,
                })
                .await
                .unwrap();
            TranscodeTask {
                upload_dir: stored.dir,
                video_id: asset.id,
                source_path: stored.source_path,
                content_hash: stored.content_hash,
            }
        }
    }

    #[tokio::test]
    async fn encodes_in_ascending_height_and_cleans_up_the_raw_upload() {
        let fx = fixture();
        let transcoder = Arc::new(FakeTranscoder::new(12.5));
        let pipeline = fx.pipeline(transcoder.clone());
        let task = fx.task().await;

        pipeline.process(&task).await.unwrap();

        // Configured as 480 then 360.
        assert_eq!(transcoder.encoded(), ["360", "480"]);
        assert!(!task.source_path.exists());
        for name in ["360.m3u8", "480.m3u8", "360_000.ts", MASTER_PLAYLIST] {
            assert!(task.upload_dir.join(name).exists(), "{name}");
        }
        assert_eq!(fx.tracker.get_by_id(task.video_id).await.unwrap().status, VideoStatus::Processed);

        fx.notifier.shutdown().await;
        assert_eq!(fx.sink.events()[0].kind, NotificationKind::Success);
    }

    #[tokio::test]
    async fn derived_master_lists_measured_renditions() {
        let mut fx = fixture();
        fx.config.master_playlist_mode = MasterPlaylistMode::Derived;
        let pipeline = fx.pipeline(Arc::new(FakeTranscoder::new(12.5)));
        let task = fx.task().await;

        pipeline.process(&task).await.unwrap();

        let master = std::fs::read_to_string(task.upload_dir.join(MASTER_PLAYLIST)).unwrap();
        // Two 3600-byte segments over 12.5s.
        let expected_360 = (7200.0_f64 * 8.0 / 12.5).round() as u64;
        assert!(master.contains(&format!("BANDWIDTH={expected_360},RESOLUTION=640x360")));
        assert!(master.contains(&format!("{}/480.m3u8", task.content_hash)));
        assert!(!master.contains("1080"));
    }

    #[tokio::test]
    async fn fixed_master_keeps_the_legacy_ladder() {
        let fx = fixture();
        let pipeline = fx.pipeline(Arc::new(FakeTranscoder::new(12.5)));
        let task = fx.task().await;

        pipeline.process(&task).await.unwrap();

        let master = std::fs::read_to_string(task.upload_dir.join(MASTER_PLAYLIST)).unwrap();
        assert!(master.contains("BANDWIDTH=5000000,RESOLUTION=1920x1080"));
        assert!(master.contains(&format!("{}/720.m3u8", task.content_hash)));
    }

    #[tokio::test]
    async fn encoder_failure_discards_every_rendition() {
        let fx = fixture();
        let transcoder = Arc::new(FakeTranscoder::new(12.5).failing_on("480"));
        let pipeline = fx.pipeline(transcoder.clone());
        let task = fx.task().await;

        let err = pipeline.process(&task).await.unwrap_err();

        assert!(matches!(err, VideoError::Encode { ref resolution, .. } if resolution == "480"));
        assert_eq!(transcoder.encoded(), ["360", "480"]);
        assert!(!task.upload_dir.exists());
        assert_eq!(fx.tracker.get_by_id(task.video_id).await.unwrap().status, VideoStatus::Failed);

        fx.notifier.shutdown().await;
        let events = fx.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NotificationKind::Failure);
        assert_eq!(events[0].asset_id, task.video_id);
    }

    #[tokio::test]
    async fn first_failure_stops_remaining_resolutions() {
        let fx = fixture();
        let transcoder = Arc::new(FakeTranscoder::new(12.5).failing_on("360"));
        let pipeline = fx.pipeline(transcoder.clone());
        let task = fx.task().await;

        pipeline.process(&task).await.unwrap_err();
        assert_eq!(transcoder.encoded(), ["360"]);
    }
}
