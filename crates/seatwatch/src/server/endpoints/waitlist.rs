//! Waitlist CRUD and the on-demand availability check.

use crate::db::NewWaitlistEntry;
use crate::server::middleware::session_validator::SessionId;
use crate::server::types::{ok, portal_error, store_error, ApiError};
use crate::state::{AppState, SessionKey};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct WaitlistPayload {
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    pub class_id: String,
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub check_interval_secs: Option<i64>,
}

/// Lists the session's waitlist entries, newest first.
pub async fn get_waitlist(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response, ApiError> {
    let entries = state
        .store
        .waitlist_for_session(&session_id)
        .map_err(store_error)?;
    Ok(ok(entries))
}

/// Adds a course section to the session's waitlist.
pub async fn post_waitlist(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(payload): Json<WaitlistPayload>,
) -> Result<Response, ApiError> {
    if payload.course_code.trim().is_empty() {
        return Err(ApiError::from((
            StatusCode::BAD_REQUEST,
            "course_code is required",
        )));
    }
    if payload.class_id.trim().is_empty() {
        return Err(ApiError::from((
            StatusCode::BAD_REQUEST,
            "class_id is required",
        )));
    }

    let entry = state
        .store
        .insert_waitlist_entry(&NewWaitlistEntry {
            session_id: session_id.clone(),
            course_code: payload.course_code,
            course_name: payload.course_name,
            class_id: payload.class_id,
            class_code: payload.class_code,
            priority: payload.priority,
            check_interval_secs: payload.check_interval_secs.unwrap_or(300).max(30),
        })
        .map_err(store_error)?;

    info!(
        session = %SessionKey::from_id(&session_id),
        entry_id = entry.id,
        class_code = %entry.class_code,
        "waitlist entry created"
    );
    Ok(ok(entry))
}

/// Cancels a `waiting` entry. 404 when the entry does not exist, belongs to
/// another session, or is already terminal.
pub async fn delete_waitlist(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let cancelled = state
        .store
        .cancel_waitlist_entry(&session_id, id)
        .map_err(store_error)?;
    if !cancelled {
        return Err(ApiError::from((
            StatusCode::NOT_FOUND,
            "no cancellable waitlist entry with that id",
        )));
    }
    Ok(ok(serde_json::json!({ "cancelled": id })))
}

/// Runs one full check-and-attempt cycle over the session's waiting entries,
/// right now, ignoring their advisory check intervals.
pub async fn post_check(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response, ApiError> {
    // Serialize on-demand cycles per session so double-submits do not race.
    let lock = state.session_lock(&session_id);
    let _guard = lock.lock().await;

    let Some(record) = state
        .store
        .get_portal_session(&session_id)
        .map_err(store_error)?
    else {
        return Err(ApiError::from((
            StatusCode::UNAUTHORIZED,
            "no stored portal session, please log in first",
        )));
    };
    let portal = state
        .portal_client_for(&record)
        .map_err(|e| portal_error(&e))?;

    let report = state
        .processor()
        .process_session(&session_id, &portal)
        .await
        .map_err(store_error)?;
    Ok(ok(report))
}
