//! Registration audit log listing.

use crate::server::middleware::session_validator::SessionId;
use crate::server::types::{ok, store_error, ApiError};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Extension;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// The session's registration attempts, newest first.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let logs = state
        .store
        .logs_for_session(&session_id, limit)
        .map_err(store_error)?;
    Ok(ok(logs))
}
