//! Bearer-token guard for the scheduled sweep endpoint.

use crate::server::types::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::warn;

/// When `CRON_SECRET` is configured, the sweep endpoint requires
/// `Authorization: Bearer <secret>`. Without a configured secret the
/// endpoint is open (e.g. behind a private network).
pub async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = &state.config.cron_secret else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == secret)
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        warn!("cron endpoint called without a valid bearer token");
        ApiError::from((StatusCode::UNAUTHORIZED, "invalid cron token")).into_response()
    }
}
