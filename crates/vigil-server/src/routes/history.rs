//! Verdict history routes.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_core::{Error, HistoryFilter, Verdict, VerdictStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create history router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/history", get(list_history))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub session_id: Option<String>,
    pub status: Option<String>,
    pub min_threat_level: Option<u8>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// `asc` for oldest first
    pub order: Option<String>,
}

impl HistoryQuery {
    fn into_filter(self) -> Result<HistoryFilter, ApiError> {
        let status = self
            .status
            .map(|s| s.parse::<VerdictStatus>())
            .transpose()
            .map_err(|e| ApiError(Error::InvalidConfig(e)))?;

        let ascending = match self.order.as_deref() {
            None | Some("desc") => false,
            Some("asc") => true,
            Some(other) => {
                return Err(ApiError(Error::InvalidConfig(format!(
                    "order must be asc or desc, got {other}"
                ))));
            }
        };

        Ok(HistoryFilter {
            session_id: self.session_id,
            status,
            min_threat_level: self.min_threat_level,
            since: self.since,
            limit: self.limit,
            offset: self.offset,
            ascending,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: u64,
    pub count: usize,
    pub verdicts: Vec<Verdict>,
}

/// List stored verdicts, newest first unless `order=asc`
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let filter = query.into_filter()?;
    let verdicts = state.monitor.history(&filter)?;
    let total = state.monitor.record_count()?;

    Ok(Json(HistoryResponse {
        total,
        count: verdicts.len(),
        verdicts,
    }))
}
