//! Login against the student portal.

use crate::db::PortalSessionRecord;
use crate::portal::PortalError;
use crate::server::types::{ok, portal_error, store_error, ApiError};
use crate::state::{generate_session_id, AppState, SessionKey};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub notify_email: Option<String>,
}

/// Authenticates against the portal and stores the resulting access token
/// under a fresh opaque session id, which the client presents on every
/// subsequent request.
pub async fn post_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Response, ApiError> {
    if payload.username.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(ApiError::from((
            StatusCode::BAD_REQUEST,
            "username and password are required",
        )));
    }

    let client = state.portal_client().map_err(|e| portal_error(&e))?;
    let outcome = client
        .login(payload.username.trim(), &payload.password)
        .await
        .map_err(|e| match e {
            PortalError::LoginRejected { message } => ApiError::from((
                StatusCode::UNAUTHORIZED,
                "portal rejected the credentials",
                Some(message),
            )),
            other => portal_error(&other),
        })?;

    let session_id = generate_session_id();
    let now = Utc::now();
    state
        .store
        .upsert_portal_session(&PortalSessionRecord {
            session_id: session_id.clone(),
            student_code: outcome.student_code.clone(),
            access_token: outcome.access_token,
            notify_email: payload
                .notify_email
                .filter(|e| !e.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
        .map_err(store_error)?;

    info!(
        session = %SessionKey::from_id(&session_id),
        student_code = %outcome.student_code,
        "portal login succeeded"
    );
    Ok(ok(json!({
        "session_id": session_id,
        "student_code": outcome.student_code,
    })))
}
