//! Monitoring session routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use vigil_core::{SessionConfig, SessionSnapshot};

use crate::error::ApiResult;
use crate::state::AppState;

/// Create monitoring router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
        .route("/monitoring/status", get(get_status))
        .route("/monitoring/reset", post(reset_engine))
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: String,
    pub snapshot: SessionSnapshot,
}

/// Start a monitoring session
pub async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionConfig>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    let session_id = state.monitor.start(req).await?;
    let snapshot = state.monitor.status().await;

    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            session_id,
            snapshot,
        }),
    ))
}

/// Stop the running session
pub async fn stop_monitoring(State(state): State<Arc<AppState>>) -> ApiResult<Json<SessionSnapshot>> {
    state.monitor.stop().await?;
    Ok(Json(state.monitor.status().await))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.monitor.status().await)
}

/// Clear a fault so a new session can start
pub async fn reset_engine(State(state): State<Arc<AppState>>) -> ApiResult<Json<SessionSnapshot>> {
    state.monitor.reset().await?;
    Ok(Json(state.monitor.status().await))
}
