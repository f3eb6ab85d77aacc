//! Middleware extracting the owning session for protected endpoints.

use crate::server::types::ApiError;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// The authenticated session's opaque identifier, inserted as a request
/// extension for downstream handlers.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Accepts the session id from the `x-session-id` header or a `session_id`
/// cookie; rejects the request with a 401 when neither is present.
pub async fn require_session(mut request: Request, next: Next) -> Response {
    let from_header = request
        .headers()
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let session_id = from_header.or_else(|| {
        request
            .headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(cookie_value)
    });

    match session_id {
        Some(id) if !id.is_empty() => {
            request.extensions_mut().insert(SessionId(id));
            next.run(request).await
        }
        _ => ApiError::from((StatusCode::UNAUTHORIZED, "missing or invalid session"))
            .into_response(),
    }
}

fn cookie_value(cookie_header: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session_id").then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value_extraction() {
        assert_eq!(
            cookie_value("theme=dark; session_id=abc123; lang=vi"),
            Some("abc123".to_string())
        );
        assert_eq!(cookie_value("theme=dark"), None);
        assert_eq!(cookie_value(""), None);
    }
}
