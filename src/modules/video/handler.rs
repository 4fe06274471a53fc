use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::dto::{ListVideosQuery, UpdateVideoRequest, UploadForm, UploadResponse, VideoResponse};
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::{StagedFile, stream_to_staging};
use crate::state::AppState;

/// Upload a video
/// Multipart form with `file`, `name` and `description`. Returns once the
/// transcode task is queued.
#[utoipa::path(
    post,
    path = "/api/v1/videos",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Upload accepted", body = ApiResponse<UploadResponse>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn upload_video(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let mut form = UploadForm::default();
    let mut staged: Option<StagedFile> = None;

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            match field.name().unwrap_or("") {
                "file" => {
                    let file = stream_to_staging(&state.staging_dir(), field)
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?;
                    if let Some(previous) = staged.replace(file) {
                        previous.discard().await;
                    }
                }
                "name" => form.name = field.text().await.map_err(|e| ApiError::bad_request(e.body_text()))?,
                "description" => {
                    form.description = field.text().await.map_err(|e| ApiError::bad_request(e.body_text()))?
                }
                _ => {}
            }
        }

        form.validate()?;
        let file = staged.as_ref().ok_or_else(|| ApiError::bad_request("No file field found in multipart request"))?;
        info!(op = "upload_video", file_name = %file.file_name, size = file.size, "upload received");

        let mut reader = file.open().await.map_err(|_| ApiError::internal())?;
        let asset = state
            .ingest
            .ingest(&mut reader, &file.file_name, file.size, std::mem::take(&mut form).into())
            .await?;
        Ok::<_, ApiError>(asset)
    }
    .await;

    if let Some(file) = staged {
        file.discard().await;
    }

    let asset = result?;
    Ok(ApiSuccess::created(UploadResponse::from(asset), "Video uploaded successfully").into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/videos",
    params(ListVideosQuery),
    responses(
        (status = 200, description = "List Videos", body = ApiResponse<Vec<VideoResponse>>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn list_videos(State(state): State<AppState>, Query(query): Query<ListVideosQuery>) -> impl IntoResponse {
    match state.videos.list(query.status).await {
        Ok(videos) => {
            let videos: Vec<VideoResponse> = videos.into_iter().map(VideoResponse::from).collect();
            ApiSuccess::ok(videos, "Videos retrieved successfully").into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Playback
/// `{uuid}` returns the master playlist, `{hash}/{label}.m3u8` a variant
/// playlist and `{hash}/{segment}.ts` a media segment.
#[utoipa::path(
    get,
    path = "/api/v1/videos/{path}",
    params(
        ("path" = String, Path, description = "Video uuid, or content hash and file name")
    ),
    responses(
        (status = 200, description = "Playlist or segment bytes"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn play_video(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let resolved = match state.resolver.resolve(&path).await {
        Ok(resolved) => resolved,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CONTENT_TYPE, resolved.content_type)
        .header(header::CONTENT_LENGTH, resolved.bytes.len());
    if resolved.is_playlist() {
        builder = builder.header(header::CACHE_CONTROL, "no-cache");
    }

    builder
        .body(Body::from(resolved.bytes))
        .unwrap_or_else(|_| ApiError::internal().into_response())
}

#[utoipa::path(
    put,
    path = "/api/v1/videos/{uuid}",
    params(
        ("uuid" = Uuid, Path, description = "Video ID")
    ),
    request_body = UpdateVideoRequest,
    responses(
        (status = 200, description = "Video Updated", body = ApiResponse<VideoResponse>),
        (status = 400, description = "Bad Request"),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn update_video(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(req): Json<UpdateVideoRequest>,
) -> Result<Response, ApiError> {
    let uuid = parse_uuid(&path)?;
    req.validate()?;

    let video = state.videos.update_info(uuid, &req.name, &req.description).await?;
    Ok(ApiSuccess::ok(VideoResponse::from(video), "Video updated successfully").into_response())
}

/// Delete a video and its renditions
#[utoipa::path(
    delete,
    path = "/api/v1/videos/{uuid}",
    params(
        ("uuid" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video Deleted"),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn delete_video(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, ApiError> {
    let uuid = parse_uuid(&path)?;
    state.videos.hard_delete(uuid).await?;
    Ok(ApiSuccess::ok((), "Video deleted successfully").into_response())
}

/// Disable a video
/// Hides it from listings and playback without touching its files.
#[utoipa::path(
    post,
    path = "/api/v1/videos/{uuid}/disable",
    params(
        ("uuid" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video Disabled"),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn disable_video(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, ApiError> {
    let uuid = path
        .strip_suffix("/disable")
        .ok_or_else(ApiError::not_found)
        .and_then(parse_uuid)?;
    state.videos.soft_delete(uuid).await?;
    Ok(ApiSuccess::ok((), "Video disabled successfully").into_response())
}

/// `PUT`, `DELETE` and `POST .../disable` share the playback wildcard route.
fn parse_uuid(path: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(path.trim_matches('/')).map_err(|_| ApiError::not_found())
}
