//! Direct, user-initiated registration and cancellation.
//!
//! Unlike the batch engines these calls run immediately, may carry the
//! portal's human-verification token, and check the candidate section
//! against the student's current timetable before registering.

use crate::db::{LogAction, LogStatus, NewLogEntry};
use crate::portal::Portal;
use crate::schedule::{find_schedule_conflicts, ParsedSchedule};
use crate::server::middleware::session_validator::SessionId;
use crate::server::types::{ok, portal_error, store_error, ApiError};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub course_code: String,
    pub class_id: String,
    #[serde(default)]
    pub verification_token: Option<String>,
    /// Skip the timetable conflict check.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct CancelPayload {
    pub registration_id: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub class_code: String,
    #[serde(default)]
    pub verification_token: Option<String>,
}

/// Registers for a section right now.
///
/// Looks the section up for its current listing, rejects with a 409 when it
/// overlaps an already-registered class (unless `force` is set), then
/// forwards the registration to the portal and audit-logs the attempt.
pub async fn post_register(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Response, ApiError> {
    if payload.course_code.trim().is_empty() || payload.class_id.trim().is_empty() {
        return Err(ApiError::from((
            StatusCode::BAD_REQUEST,
            "course_code and class_id are required",
        )));
    }

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

    let sections = portal
        .get_class_sections(&state.config.period_id, payload.course_code.trim())
        .await
        .map_err(|e| portal_error(&e))?;
    let Some(section) = sections.into_iter().find(|s| s.id == payload.class_id) else {
        return Err(ApiError::from((
            StatusCode::NOT_FOUND,
            "section not listed for this course",
        )));
    };

    if !payload.force {
        let registered = portal
            .get_registered_classes()
            .await
            .map_err(|e| portal_error(&e))?;
        let candidate = ParsedSchedule::from_text(
            &section.class_code,
            &section.course_name,
            section.schedule_text.as_deref().unwrap_or(""),
        );
        let existing: Vec<ParsedSchedule> = registered
            .iter()
            .map(|c| {
                ParsedSchedule::from_text(
                    &c.class_code,
                    &c.course_name,
                    c.schedule_text.as_deref().unwrap_or(""),
                )
            })
            .collect();
        let conflicts = find_schedule_conflicts(&candidate, &existing);
        if !conflicts.is_empty() {
            return Ok((
                StatusCode::CONFLICT,
                Json(json!({
                    "success": false,
                    "message": "section conflicts with the current timetable",
                    "conflicts": conflicts,
                })),
            )
                .into_response());
        }
    }

    let outcome = portal
        .register_for_class(&payload.class_id, payload.verification_token.as_deref())
        .await
        .map_err(|e| portal_error(&e))?;

    state
        .store
        .append_log(&NewLogEntry {
            session_id: session_id.clone(),
            action: LogAction::Register,
            course_code: payload.course_code.trim().to_string(),
            course_name: section.course_name.clone(),
            class_code: section.class_code.clone(),
            status: if outcome.success {
                LogStatus::Success
            } else {
                LogStatus::Failed
            },
            message: outcome.message.clone(),
        })
        .map_err(store_error)?;

    if outcome.success {
        info!(class_code = %section.class_code, "direct registration succeeded");
    }
    Ok(ok(json!({
        "registered": outcome.success,
        "message": outcome.message,
    })))
}

/// Cancels an existing portal registration and audit-logs the attempt.
pub async fn post_cancel(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Json(payload): Json<CancelPayload>,
) -> Result<Response, ApiError> {
    if payload.registration_id.trim().is_empty() {
        return Err(ApiError::from((
            StatusCode::BAD_REQUEST,
            "registration_id is required",
        )));
    }

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

    let outcome = portal
        .cancel_registration(
            payload.registration_id.trim(),
            payload.verification_token.as_deref(),
        )
        .await
        .map_err(|e| portal_error(&e))?;

    state
        .store
        .append_log(&NewLogEntry {
            session_id,
            action: LogAction::Cancel,
            course_code: payload.course_code,
            course_name: payload.course_name,
            class_code: payload.class_code,
            status: if outcome.success {
                LogStatus::Success
            } else {
                LogStatus::Failed
            },
            message: outcome.message.clone(),
        })
        .map_err(store_error)?;

    Ok(ok(json!({
        "cancelled": outcome.success,
        "message": outcome.message,
    })))
}
