use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod ingest;
pub mod memory;
pub mod model;
pub mod playback;
pub mod repository;
pub mod service;
pub mod status;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/videos",
            get(handler::list_videos).post(handler::upload_video),
        )
        .route(
            "/videos/{*path}",
            get(handler::play_video)
                .put(handler::update_video)
                .delete(handler::delete_video)
                .post(handler::disable_video),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
