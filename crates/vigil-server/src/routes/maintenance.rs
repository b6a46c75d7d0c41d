//! Maintenance routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::post,
};
use serde::Deserialize;
use std::sync::Arc;
use vigil_core::RetentionPolicy;
use vigil_core::types::PruneReport;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create maintenance router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/maintenance/prune", post(prune))
}

/// Overrides for the configured retention policy
#[derive(Debug, Default, Deserialize)]
pub struct PruneQuery {
    pub max_records: Option<u64>,
    pub max_age_days: Option<u32>,
}

/// Apply retention now
pub async fn prune(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PruneQuery>,
) -> ApiResult<Json<PruneReport>> {
    let configured = state.config.storage.retention;
    let policy = RetentionPolicy {
        max_records: query.max_records.unwrap_or(configured.max_records),
        max_age_days: query.max_age_days.unwrap_or(configured.max_age_days),
    };

    Ok(Json(state.monitor.prune(&policy).await?))
}
