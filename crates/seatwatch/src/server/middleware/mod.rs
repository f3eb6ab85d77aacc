pub mod cron_auth;
pub mod session_validator;
