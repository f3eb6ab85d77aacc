//! Error types for the course-portal client.

use thiserror::Error;

/// Errors that can occur while talking to the student portal.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Network/HTTP request failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The stored portal token is no longer accepted
    #[error("portal session expired or unauthorized")]
    SessionExpired,

    /// The portal rejected the login credentials
    #[error("login rejected: {message}")]
    LoginRejected { message: String },

    /// The portal returned something the client could not interpret
    #[error("unexpected portal response: {message}")]
    UnexpectedResponse { message: String },

    /// Portal URL construction failed
    #[error("invalid portal URL: {0}")]
    Url(#[from] url::ParseError),
}

impl PortalError {
    /// Returns true if this error means the caller needs to re-authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            PortalError::SessionExpired | PortalError::LoginRejected { .. }
        )
    }
}
