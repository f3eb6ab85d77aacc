//! Persistent entity types for the waitlist, scheduler and audit-log stores.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

/// Lifecycle of a waitlist entry. `Registered`, `Cancelled` and `Expired` are
/// terminal: an entry never transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Waiting,
    Registered,
    Cancelled,
    Expired,
}

impl WaitlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistStatus::Waiting => "waiting",
            WaitlistStatus::Registered => "registered",
            WaitlistStatus::Cancelled => "cancelled",
            WaitlistStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(WaitlistStatus::Waiting),
            "registered" => Some(WaitlistStatus::Registered),
            "cancelled" => Some(WaitlistStatus::Cancelled),
            "expired" => Some(WaitlistStatus::Expired),
            _ => None,
        }
    }
}

impl ToSql for WaitlistStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for WaitlistStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown waitlist status: {s}").into()))
    }
}

/// Lifecycle of a one-shot scheduled registration. Everything except
/// `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Succeeded => "succeeded",
            ScheduleStatus::Failed => "failed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScheduleStatus::Pending),
            "succeeded" => Some(ScheduleStatus::Succeeded),
            "failed" => Some(ScheduleStatus::Failed),
            "cancelled" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }
}

impl ToSql for ScheduleStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScheduleStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown schedule status: {s}").into()))
    }
}

/// What a registration-log row records: an attempt to register or to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Register,
    Cancel,
}

impl ToSql for LogAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(match self {
            LogAction::Register => "register",
            LogAction::Cancel => "cancel",
        }))
    }
}

impl FromSql for LogAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "register" => Ok(LogAction::Register),
            "cancel" => Ok(LogAction::Cancel),
            s => Err(FromSqlError::Other(format!("unknown log action: {s}").into())),
        }
    }
}

/// Outcome recorded in the registration log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
}

impl ToSql for LogStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }))
    }
}

impl FromSql for LogStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "success" => Ok(LogStatus::Success),
            "failed" => Ok(LogStatus::Failed),
            s => Err(FromSqlError::Other(format!("unknown log status: {s}").into())),
        }
    }
}

/// A persisted intent to auto-register for a section whenever it has room.
#[derive(Debug, Clone, Serialize)]
pub struct WaitlistEntry {
    pub id: i64,
    #[serde(skip_serializing)]
    pub session_id: String,
    pub course_code: String,
    pub course_name: String,
    pub class_id: String,
    pub class_code: String,
    pub priority: i64,
    pub status: WaitlistStatus,
    pub check_interval_secs: i64,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Whether the advisory check interval has elapsed since the last check.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(t) => now - t >= Duration::seconds(self.check_interval_secs),
        }
    }
}

/// Parameters for inserting a new waitlist entry.
#[derive(Debug, Clone)]
pub struct NewWaitlistEntry {
    pub session_id: String,
    pub course_code: String,
    pub course_name: String,
    pub class_id: String,
    pub class_code: String,
    pub priority: i64,
    pub check_interval_secs: i64,
}

/// A one-shot registration attempt that fires at or after a target time,
/// with bounded retries.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRegistration {
    pub id: i64,
    #[serde(skip_serializing)]
    pub session_id: String,
    pub course_code: String,
    pub course_name: String,
    pub class_id: String,
    pub class_code: String,
    pub fire_at: DateTime<Utc>,
    pub max_attempts: i64,
    pub attempt_count: i64,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new scheduled registration.
#[derive(Debug, Clone)]
pub struct NewScheduledRegistration {
    pub session_id: String,
    pub course_code: String,
    pub course_name: String,
    pub class_id: String,
    pub class_code: String,
    pub fire_at: DateTime<Utc>,
    pub max_attempts: i64,
}

/// An append-only audit record of a registration or cancellation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationLogEntry {
    pub id: i64,
    #[serde(skip_serializing)]
    pub session_id: String,
    pub action: LogAction,
    pub course_code: String,
    pub course_name: String,
    pub class_code: String,
    pub status: LogStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for appending a registration-log row.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub session_id: String,
    pub action: LogAction,
    pub course_code: String,
    pub course_name: String,
    pub class_code: String,
    pub status: LogStatus,
    pub message: String,
}

/// A stored portal credential for one authenticated session, keyed by the
/// opaque session id handed to the client at login.
#[derive(Debug, Clone)]
pub struct PortalSessionRecord {
    pub session_id: String,
    pub student_code: String,
    pub access_token: String,
    pub notify_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
