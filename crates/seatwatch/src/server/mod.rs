use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{middleware as mw, Router};

use crate::server::endpoints::{auth, cron, logs, portal, scheduler, status, waitlist};
use crate::server::middleware::{cron_auth, session_validator};
use crate::state::AppState;

mod endpoints;
mod middleware;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Router whose endpoints require a session id header or cookie
    let session_router = Router::new()
        .route("/waitlist", get(waitlist::get_waitlist))
        .route("/waitlist", post(waitlist::post_waitlist))
        .route("/waitlist/:id", delete(waitlist::delete_waitlist))
        .route("/waitlist/check", post(waitlist::post_check))
        .route("/scheduler", get(scheduler::get_scheduler))
        .route("/scheduler", post(scheduler::post_scheduler))
        .route("/scheduler/:id", delete(scheduler::delete_scheduler))
        .route("/logs", get(logs::get_logs))
        .route("/portal/register", post(portal::post_register))
        .route("/portal/cancel", post(portal::post_cancel))
        .layer(mw::from_fn(session_validator::require_session));

    // Sweep router for the external cron caller
    let cron_router = Router::new()
        .route("/cron/waitlist", get(cron::get_waitlist_sweep))
        .layer(mw::from_fn_with_state(
            app_state.clone(),
            cron_auth::require_cron_secret,
        ));

    Router::new()
        .route("/health", get(status::get_health))
        .route("/login", post(auth::post_login))
        .merge(session_router)
        .merge(cron_router)
        .with_state(app_state)
}
