//! On-demand capture and camera status routes.

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use vigil_core::capture::CameraHealth;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create capture router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/capture", post(capture_now))
        .route("/camera/status", get(camera_status))
}

/// Capture one frame, save it and return it as JPEG
pub async fn capture_now(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let (frame, path) = state.monitor.capture_now().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::HeaderName::from_static("x-vigil-image-path"),
                path.to_string_lossy().into_owned(),
            ),
        ],
        frame.bytes,
    ))
}

pub async fn camera_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<CameraHealth>> {
    Ok(Json(state.monitor.camera_health().await?))
}
