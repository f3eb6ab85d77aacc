//! JSON response shapes shared by every endpoint.
//!
//! Success bodies are `{success: true, data}` and errors are
//! `{success: false, message, detail?}` with a conventional status code.

use crate::portal::PortalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// An API error with a status code, a stable message, and optional detail.
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl From<(StatusCode, &str)> for ApiError {
    fn from((status, message): (StatusCode, &str)) -> Self {
        Self {
            status,
            message: message.to_string(),
            detail: None,
        }
    }
}

impl From<(StatusCode, &str, Option<String>)> for ApiError {
    fn from((status, message, detail): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            message: message.to_string(),
            detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "success": false,
                "message": self.message,
                "detail": self.detail,
            })),
        )
            .into_response()
    }
}

/// 200 with a `{success: true, data}` body.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

/// Maps a store failure to a generic 500. The underlying error is for the
/// log, not the client.
pub fn store_error(e: rusqlite::Error) -> ApiError {
    ApiError::from((
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal storage error",
        Some(e.to_string()),
    ))
}

/// Maps a portal failure on a direct (non-batch) call to an API error.
/// Inside the processing loops portal failures are data, not errors.
pub fn portal_error(e: &PortalError) -> ApiError {
    if e.is_auth() {
        ApiError::from((
            StatusCode::UNAUTHORIZED,
            "portal session expired, please log in again",
            Some(e.to_string()),
        ))
    } else {
        ApiError::from((
            StatusCode::BAD_GATEWAY,
            "student portal request failed",
            Some(e.to_string()),
        ))
    }
}
