//! Shared application state and session helpers.

use crate::config::AppConfig;
use crate::db::{PortalSessionRecord, Store};
use crate::notify::Mailer;
use crate::portal::{PortalClient, PortalError};
use crate::scheduler::AutoRegistrationScheduler;
use crate::waitlist::WaitlistProcessor;
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// State shared by every request handler.
pub struct AppState {
    pub store: Arc<Store>,
    pub config: AppConfig,
    pub mailer: Option<Arc<Mailer>>,
    /// Per-session locks serializing on-demand processing, so two rapid
    /// clicks from the same user do not race each other in-process.
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: AppConfig, mailer: Option<Arc<Mailer>>) -> Self {
        Self {
            store,
            config,
            mailer,
            session_locks: DashMap::new(),
        }
    }

    /// Gets or creates the processing lock for a session.
    pub fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// An unauthenticated portal client (for login).
    pub fn portal_client(&self) -> Result<PortalClient, PortalError> {
        PortalClient::new(&self.config.portal_base_url, &self.config.user_agent)
    }

    /// A portal client bound to a stored session's access token.
    pub fn portal_client_for(
        &self,
        record: &PortalSessionRecord,
    ) -> Result<PortalClient, PortalError> {
        Ok(self.portal_client()?.with_token(record.access_token.clone()))
    }

    pub fn processor(&self) -> WaitlistProcessor {
        WaitlistProcessor::new(
            self.store.clone(),
            self.config.period_id.clone(),
            self.mailer.clone(),
        )
    }

    pub fn scheduler(&self) -> AutoRegistrationScheduler {
        AutoRegistrationScheduler::new(self.store.clone())
    }
}

/// A hashed session identifier safe to put in logs.
///
/// The raw id is an authentication credential; hashing keeps it out of log
/// output while leaving entries correlatable.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn from_id(session_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

/// Generates a fresh opaque session id handed to the client at login.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(&bytes)
}

/// Helper module for hex encoding (avoiding an extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_is_stable_and_distinct() {
        let a = SessionKey::from_id("session123");
        let b = SessionKey::from_id("session123");
        let c = SessionKey::from_id("session456");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_session_key_display_truncates() {
        let key = SessionKey::from_id("session123");
        let shown = key.to_string();
        assert!(shown.ends_with("..."));
        assert_eq!(shown.len(), 11);
    }

    #[test]
    fn test_generated_session_ids_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
