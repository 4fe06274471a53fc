use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::state::AppState;

pub fn configure_routes(state: &AppState) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api_routes(state))
        .layer(cors)
}

fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(crate::modules::video::router(state.config.max_upload_bytes))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queued_tasks: usize,
    pub queue_capacity: usize,
    pub notifications_delivered: u64,
    pub notifications_failed: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let notifications = state.notifier.stats();
    Json(HealthResponse {
        status: "ok",
        queued_tasks: state.queue.len(),
        queue_capacity: state.queue.capacity(),
        notifications_delivered: notifications.delivered,
        notifications_failed: notifications.failed,
    })
}
