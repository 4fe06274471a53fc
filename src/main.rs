use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::{connect_to_db, run_migrations};
use crate::infrastructure::transcoder::ffmpeg::FfmpegTranscoder;
use crate::modules::notification::LogNotificationSink;
use crate::modules::video::memory::InMemoryVideoRepository;
use crate::modules::video::repository::{PgVideoRepository, VideoRepository};

mod app;
mod common;
mod config;
mod docs;
mod error;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("invalid configuration")?;

    let repo: Arc<dyn VideoRepository> = match &config.database_url {
        Some(url) => {
            let pool = connect_to_db(url).await.context("connecting to PostgreSQL")?;
            run_migrations(&pool).await.context("running migrations")?;
            Arc::new(PgVideoRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL is not set, video records are kept in memory and lost on restart");
            Arc::new(InMemoryVideoRepository::new())
        }
    };

    let video_root = config.video_root();
    tokio::fs::create_dir_all(&video_root)
        .await
        .with_context(|| format!("creating {}", video_root.display()))?;

    let transcoder = Arc::new(FfmpegTranscoder::new(&config));
    let port = config.server_port;
    let (state, pool) = app::assemble(config, repo, transcoder, Arc::new(LogNotificationSink));
    info!(workers = pool.size(), queue_capacity = state.queue.capacity(), "transcode pool ready");
    let notifier = state.notifier.clone();
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Draining transcode queue...");
    pool.shutdown().await;
    notifier.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
