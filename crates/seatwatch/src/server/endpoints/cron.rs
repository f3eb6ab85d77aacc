//! Entry point for the externally scheduled waitlist sweep.

use crate::portal::PortalError;
use crate::server::types::{ok, store_error, ApiError};
use crate::state::AppState;
use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Runs one waitlist sweep across every session with waiting entries.
///
/// Invoked by an external cron (guarded by the bearer-token middleware);
/// each session gets a portal client bound to its stored access token.
pub async fn get_waitlist_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let report = state
        .processor()
        .run_sweep(|record| {
            let state = state.clone();
            async move {
                Ok::<_, PortalError>(state.portal_client()?.with_token(record.access_token))
            }
        })
        .await
        .map_err(store_error)?;

    Ok(ok(json!({
        "timestamp": Utc::now(),
        "sessions": report.sessions,
        "processed": report.processed,
        "registered": report.registered,
        "results": report.results,
    })))
}
