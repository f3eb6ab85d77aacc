use crate::server::types::ok;
use axum::response::Response;
use serde_json::json;

/// Liveness probe.
pub async fn get_health() -> Response {
    ok(json!({ "status": "up" }))
}
