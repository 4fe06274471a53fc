use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::content_store::ContentStore;
use crate::infrastructure::transcoder::Transcoder;
use crate::modules::notification::{NotificationDispatcher, NotificationSink};
use crate::modules::video::ingest::IngestService;
use crate::modules::video::playback::PlaybackResolver;
use crate::modules::video::repository::VideoRepository;
use crate::modules::video::service::VideoService;
use crate::modules::video::status::StatusTracker;
use crate::state::AppState;
use crate::workers::pool::WorkerPool;
use crate::workers::queue::TaskQueue;
use crate::workers::transcoder::TranscodePipeline;

/// Wires the pipeline together and starts the background workers.
/// Must run inside a tokio runtime.
pub fn assemble(
    config: AppConfig,
    repo: Arc<dyn VideoRepository>,
    transcoder: Arc<dyn Transcoder>,
    sink: Arc<dyn NotificationSink>,
) -> (AppState, WorkerPool) {
    let config = Arc::new(config);
    let store = ContentStore::from_config(&config);
    let tracker = StatusTracker::new(repo, config.status_update_retries);
    let queue = TaskQueue::new(config.queue_capacity);
    let notifier = NotificationDispatcher::start(sink, config.notification_buffer);

    let pipeline = TranscodePipeline::new(
        &config,
        store.clone(),
        transcoder.clone(),
        tracker.clone(),
        notifier.clone(),
    );
    let pool = WorkerPool::start(config.worker_count, queue.clone(), Arc::new(pipeline));

    let state = AppState::new(
        config.clone(),
        IngestService::new(store.clone(), transcoder, tracker.clone(), queue.clone()),
        PlaybackResolver::new(store.clone(), tracker.clone(), &config.resolutions),
        VideoService::new(store, tracker),
        queue,
        notifier,
    );
    (state, pool)
}

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes(&state)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
