//! Health check endpoint.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use vigil_core::EngineState;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub engine: EngineState,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub camera: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let db_healthy = state.db.ping().is_ok();

    let camera_healthy = state
        .monitor
        .camera_health()
        .await
        .map(|h| h.reachable)
        .unwrap_or(false);

    let engine = state.monitor.status().await.state;

    let status = if !db_healthy || engine == EngineState::Faulted {
        "unhealthy"
    } else if !camera_healthy {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            camera: camera_healthy,
        },
        engine,
    })
}
