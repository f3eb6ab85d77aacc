//! Scheduled one-shot registrations.
//!
//! `GET /scheduler` doubles as the execution trigger: due schedules for the
//! polling session run before the list is returned.

use crate::scheduler::{ScheduleError, ScheduleRequest};
use crate::server::middleware::session_validator::SessionId;
use crate::server::types::{ok, portal_error, store_error, ApiError};
use crate::state::{AppState, SessionKey};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Creates a new scheduled registration.
pub async fn post_scheduler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Response, ApiError> {
    let record = state
        .scheduler()
        .schedule_registration(&session_id, request)
        .map_err(|e| match e {
            ScheduleError::Invalid(message) => {
                ApiError::from((StatusCode::BAD_REQUEST, message))
            }
            ScheduleError::DuplicatePending => ApiError::from((
                StatusCode::BAD_REQUEST,
                "a pending schedule for this class already exists",
            )),
            ScheduleError::Store(e) => store_error(e),
        })?;

    info!(
        session = %SessionKey::from_id(&session_id),
        schedule_id = record.id,
        "registration scheduled"
    );
    Ok(ok(record))
}

/// Executes the session's due schedules, then returns every schedule.
///
/// When the session has no stored portal credentials the execution pass is
/// skipped and only the listing is returned.
pub async fn get_scheduler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response, ApiError> {
    let lock = state.session_lock(&session_id);
    let _guard = lock.lock().await;

    let scheduler = state.scheduler();
    let executed = match state
        .store
        .get_portal_session(&session_id)
        .map_err(store_error)?
    {
        Some(record) => {
            let portal = state
                .portal_client_for(&record)
                .map_err(|e| portal_error(&e))?;
            scheduler
                .check_and_execute_pending(&session_id, &portal)
                .await
                .map_err(store_error)?
        }
        None => Vec::new(),
    };

    let schedules = scheduler
        .get_user_schedules(&session_id)
        .map_err(store_error)?;
    Ok(ok(json!({
        "executed": executed,
        "schedules": schedules,
    })))
}

/// Cancels a pending schedule. 404 when there is nothing to cancel.
pub async fn delete_scheduler(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let cancelled = state
        .scheduler()
        .cancel_schedule(&session_id, id)
        .map_err(store_error)?;
    if !cancelled {
        return Err(ApiError::from((
            StatusCode::NOT_FOUND,
            "no cancellable schedule with that id",
        )));
    }
    Ok(ok(json!({ "cancelled": id })))
}
