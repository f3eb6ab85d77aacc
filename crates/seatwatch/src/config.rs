//! Service configuration.

/// Runtime configuration, loaded from environment variables with sensible
/// defaults for local development.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to (`SEATWATCH_BIND`)
    pub bind_addr: String,
    /// Path to the SQLite database file (`SEATWATCH_DB`)
    pub db_path: String,
    /// Base URL of the student portal API (`PORTAL_BASE_URL`)
    pub portal_base_url: String,
    /// Registration period (đợt đăng ký) to query sections in
    /// (`PORTAL_PERIOD_ID`)
    pub period_id: String,
    /// Shared secret for `/cron/waitlist`; unset means the sweep endpoint
    /// is unguarded (`CRON_SECRET`)
    pub cron_secret: Option<String>,
    /// User agent sent to the portal
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            db_path: "seatwatch.db".to_string(),
            portal_base_url: "https://dkmh.university.example.vn/".to_string(),
            period_id: "current".to_string(),
            cron_secret: None,
            user_agent: concat!("seatwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("SEATWATCH_BIND").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("SEATWATCH_DB").unwrap_or(defaults.db_path),
            portal_base_url: std::env::var("PORTAL_BASE_URL").unwrap_or(defaults.portal_base_url),
            period_id: std::env::var("PORTAL_PERIOD_ID").unwrap_or(defaults.period_id),
            cron_secret: std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty()),
            user_agent: std::env::var("PORTAL_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }
}
