use utoipa::OpenApi;

use crate::common::response::ResponseStatus;
use crate::modules::video::dto::{UpdateVideoRequest, UploadResponse, VideoResponse};
use crate::modules::video::model::VideoStatus;
use crate::routes::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::list_videos,
        crate::modules::video::handler::play_video,
        crate::modules::video::handler::update_video,
        crate::modules::video::handler::delete_video,
        crate::modules::video::handler::disable_video,
    ),
    components(
        schemas(
            HealthResponse,
            ResponseStatus,
            VideoStatus,
            VideoResponse,
            UploadResponse,
            UpdateVideoRequest,
        )
    ),
    tags(
        (name = "Videos", description = "Upload, catalogue and HLS playback"),
        (name = "Health", description = "Liveness and queue depth")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_video_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/api/v1/health",
            "/api/v1/videos",
            "/api/v1/videos/{path}",
            "/api/v1/videos/{uuid}",
            "/api/v1/videos/{uuid}/disable",
        ] {
            assert!(paths.contains(&expected), "{expected} missing from {paths:?}");
        }
    }
}
