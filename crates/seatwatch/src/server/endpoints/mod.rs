pub mod auth;
pub mod cron;
pub mod logs;
pub mod portal;
pub mod scheduler;
pub mod status;
pub mod waitlist;
