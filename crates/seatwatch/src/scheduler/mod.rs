//! One-shot scheduled registration attempts.
//!
//! A lighter sibling of the waitlist engine: each schedule fires once at or
//! after its target time, with a bounded retry budget, instead of being
//! polled continuously. Execution is pull-triggered — due schedules run when
//! the owning session next polls `/scheduler`, not from a background timer.
//! A schedule whose fire time has passed therefore waits for the next poll;
//! that is the intended behavior, not a missing worker.

use crate::db::{
    LogAction, LogStatus, NewLogEntry, NewScheduledRegistration, ScheduleStatus,
    ScheduledRegistration, Store,
};
use crate::portal::Portal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_MAX_ATTEMPTS: i64 = 3;
const MAX_ALLOWED_ATTEMPTS: i64 = 10;

/// Request payload for creating a scheduled registration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    pub class_id: String,
    #[serde(default)]
    pub class_code: String,
    pub fire_at: DateTime<Utc>,
    #[serde(default)]
    pub max_attempts: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Missing or malformed input; maps to a 400.
    #[error("{0}")]
    Invalid(&'static str),

    /// The session already has a pending schedule for this class.
    #[error("a pending schedule for this class already exists")]
    DuplicatePending,

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

/// Per-schedule result of one execution pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub schedule_id: i64,
    pub course_code: String,
    pub class_code: String,
    pub status: ScheduleStatus,
    pub attempt_count: i64,
    pub message: String,
}

/// Manages `pending` scheduled registrations for display, cancellation and
/// pull-triggered execution.
pub struct AutoRegistrationScheduler {
    store: Arc<Store>,
}

impl AutoRegistrationScheduler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Validates and persists a new `pending` schedule with attempt count 0.
    ///
    /// Rejects a second pending schedule for the same class id within the
    /// same session; the duplicate guard is part of the insert statement, so
    /// two overlapping requests cannot both get through.
    pub fn schedule_registration(
        &self,
        session_id: &str,
        request: ScheduleRequest,
    ) -> Result<ScheduledRegistration, ScheduleError> {
        if request.course_code.trim().is_empty() {
            return Err(ScheduleError::Invalid("course_code is required"));
        }
        if request.class_id.trim().is_empty() {
            return Err(ScheduleError::Invalid("class_id is required"));
        }
        let max_attempts = request
            .max_attempts
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
            .clamp(1, MAX_ALLOWED_ATTEMPTS);

        let Some(record) = self.store.try_insert_schedule(&NewScheduledRegistration {
            session_id: session_id.to_string(),
            course_code: request.course_code,
            course_name: request.course_name,
            class_id: request.class_id,
            class_code: request.class_code,
            fire_at: request.fire_at,
            max_attempts,
        })?
        else {
            return Err(ScheduleError::DuplicatePending);
        };
        info!(
            schedule_id = record.id,
            fire_at = %record.fire_at,
            "scheduled registration created"
        );
        Ok(record)
    }

    /// Executes the session's due schedules: `pending`, fire time passed,
    /// attempt budget not exhausted. One registration attempt each.
    ///
    /// Success flips the schedule to `succeeded` via a conditional update;
    /// failure increments the attempt count and flips to `failed` once the
    /// budget is spent. Portal errors are folded into per-schedule results.
    pub async fn check_and_execute_pending<P: Portal>(
        &self,
        session_id: &str,
        portal: &P,
    ) -> rusqlite::Result<Vec<ExecutionResult>> {
        let due = self.store.due_schedules_for_session(session_id, Utc::now())?;
        let mut results = Vec::with_capacity(due.len());

        for schedule in due {
            let (outcome_message, attempt_failed) =
                match portal.register_for_class(&schedule.class_id, None).await {
                    Ok(outcome) if outcome.success => (outcome.message, false),
                    Ok(outcome) => (
                        if outcome.message.is_empty() {
                            "portal declined the registration".to_string()
                        } else {
                            outcome.message
                        },
                        true,
                    ),
                    Err(e) => (e.to_string(), true),
                };

            let (status, attempt_count) = if attempt_failed {
                warn!(
                    schedule_id = schedule.id,
                    message = %outcome_message,
                    "scheduled registration attempt failed"
                );
                let status = self.store.record_schedule_failure(schedule.id)?;
                self.append_log(&schedule, LogStatus::Failed, &outcome_message)?;
                (status, schedule.attempt_count + 1)
            } else if self.store.try_mark_schedule_succeeded(schedule.id)? {
                info!(schedule_id = schedule.id, "scheduled registration succeeded");
                self.append_log(&schedule, LogStatus::Success, &outcome_message)?;
                (ScheduleStatus::Succeeded, schedule.attempt_count)
            } else {
                // Lost the conditional update: cancelled or completed by a
                // concurrent invocation after we selected it. Report the
                // stored state, not our pre-attempt snapshot.
                match self.store.get_schedule(schedule.id)? {
                    Some(current) => (current.status, current.attempt_count),
                    None => (ScheduleStatus::Succeeded, schedule.attempt_count),
                }
            };

            results.push(ExecutionResult {
                schedule_id: schedule.id,
                course_code: schedule.course_code.clone(),
                class_code: schedule.class_code.clone(),
                status,
                attempt_count,
                message: outcome_message,
            });
        }

        Ok(results)
    }

    /// Cancels a pending schedule. Returns false when it does not exist, is
    /// not owned by the session, or is already terminal.
    pub fn cancel_schedule(&self, session_id: &str, id: i64) -> rusqlite::Result<bool> {
        self.store.cancel_schedule(session_id, id)
    }

    /// All of the session's schedules for display, newest first.
    pub fn get_user_schedules(
        &self,
        session_id: &str,
    ) -> rusqlite::Result<Vec<ScheduledRegistration>> {
        self.store.schedules_for_session(session_id)
    }

    fn append_log(
        &self,
        schedule: &ScheduledRegistration,
        status: LogStatus,
        message: &str,
    ) -> rusqlite::Result<()> {
        self.store.append_log(&NewLogEntry {
            session_id: schedule.session_id.clone(),
            action: LogAction::Register,
            course_code: schedule.course_code.clone(),
            course_name: schedule.course_name.clone(),
            class_code: schedule.class_code.clone(),
            status,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{AttemptOutcome, ClassSection, PortalError};
    use chrono::Duration;
    use std::sync::Mutex;

    struct FakePortal {
        register_succeeds: bool,
        attempts: Mutex<Vec<String>>,
    }

    impl FakePortal {
        fn new(register_succeeds: bool) -> Self {
            Self {
                register_succeeds,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    impl Portal for FakePortal {
        async fn get_class_sections(
            &self,
            _period_id: &str,
            _course_code: &str,
        ) -> Result<Vec<ClassSection>, PortalError> {
            Ok(Vec::new())
        }

        async fn register_for_class(
            &self,
            class_id: &str,
            _verification_token: Option<&str>,
        ) -> Result<AttemptOutcome, PortalError> {
            self.attempts.lock().unwrap().push(class_id.to_string());
            Ok(AttemptOutcome {
                success: self.register_succeeds,
                message: String::new(),
            })
        }
    }

    fn request(class_id: &str, fire_at: DateTime<Utc>) -> ScheduleRequest {
        ScheduleRequest {
            course_code: "CSE101".to_string(),
            course_name: "Intro".to_string(),
            class_id: class_id.to_string(),
            class_code: format!("CSE101.{class_id}"),
            fire_at,
            max_attempts: Some(2),
        }
    }

    fn scheduler() -> AutoRegistrationScheduler {
        AutoRegistrationScheduler::new(Arc::new(Store::open(":memory:").unwrap()))
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let scheduler = scheduler();
        let mut bad = request("a", Utc::now());
        bad.course_code = String::new();
        assert!(matches!(
            scheduler.schedule_registration("s1", bad),
            Err(ScheduleError::Invalid(_))
        ));

        let mut bad = request("a", Utc::now());
        bad.class_id = "  ".to_string();
        assert!(matches!(
            scheduler.schedule_registration("s1", bad),
            Err(ScheduleError::Invalid(_))
        ));
    }

    #[test]
    fn test_duplicate_pending_schedule_rejected() {
        let scheduler = scheduler();
        scheduler
            .schedule_registration("s1", request("a", Utc::now()))
            .unwrap();
        assert!(matches!(
            scheduler.schedule_registration("s1", request("a", Utc::now())),
            Err(ScheduleError::DuplicatePending)
        ));
        // A different class, or a different session, is fine.
        scheduler
            .schedule_registration("s1", request("b", Utc::now()))
            .unwrap();
        scheduler
            .schedule_registration("s2", request("a", Utc::now()))
            .unwrap();
    }

    #[tokio::test]
    async fn test_due_schedule_executes_and_succeeds() {
        let scheduler = scheduler();
        let created = scheduler
            .schedule_registration("s1", request("a", Utc::now() - Duration::minutes(1)))
            .unwrap();
        let portal = FakePortal::new(true);

        let results = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ScheduleStatus::Succeeded);

        // Once succeeded, no further attempts occur.
        let again = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(portal.attempt_count(), 1);

        let schedules = scheduler.get_user_schedules("s1").unwrap();
        assert_eq!(schedules[0].id, created.id);
        assert_eq!(schedules[0].status, ScheduleStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_future_schedule_does_not_execute() {
        let scheduler = scheduler();
        scheduler
            .schedule_registration("s1", request("a", Utc::now() + Duration::minutes(10)))
            .unwrap();
        let portal = FakePortal::new(true);

        let results = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(portal.attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_until_max_then_failed() {
        let scheduler = scheduler();
        scheduler
            .schedule_registration("s1", request("a", Utc::now() - Duration::minutes(1)))
            .unwrap();
        let portal = FakePortal::new(false);

        let first = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert_eq!(first[0].status, ScheduleStatus::Pending);
        assert_eq!(first[0].attempt_count, 1);

        let second = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert_eq!(second[0].status, ScheduleStatus::Failed);
        assert_eq!(second[0].attempt_count, 2);

        // Exhausted: excluded from all future due-selection.
        let third = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert!(third.is_empty());
        assert_eq!(portal.attempt_count(), 2);
    }

    // Touches the store mid-attempt, the way an overlapping invocation would.
    struct RacingPortal {
        store: Arc<Store>,
        schedule_id: i64,
    }

    impl Portal for RacingPortal {
        async fn get_class_sections(
            &self,
            _period_id: &str,
            _course_code: &str,
        ) -> Result<Vec<ClassSection>, PortalError> {
            Ok(Vec::new())
        }

        async fn register_for_class(
            &self,
            _class_id: &str,
            _verification_token: Option<&str>,
        ) -> Result<AttemptOutcome, PortalError> {
            // A concurrent run burns the schedule's last attempt while this
            // one is in flight.
            self.store.record_schedule_failure(self.schedule_id).unwrap();
            Ok(AttemptOutcome {
                success: true,
                message: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_lost_update_reports_stored_state() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let scheduler = AutoRegistrationScheduler::new(store.clone());
        let mut req = request("a", Utc::now() - Duration::minutes(1));
        req.max_attempts = Some(1);
        let created = scheduler.schedule_registration("s1", req).unwrap();

        let portal = RacingPortal {
            store,
            schedule_id: created.id,
        };
        let results = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        // The concurrent failure exhausted the budget before our success
        // landed; the result carries the store's status and attempt count,
        // not the pre-attempt snapshot.
        assert_eq!(results[0].status, ScheduleStatus::Failed);
        assert_eq!(results[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn test_cancelled_schedule_never_executes() {
        let scheduler = scheduler();
        let created = scheduler
            .schedule_registration("s1", request("a", Utc::now() - Duration::minutes(1)))
            .unwrap();

        assert!(scheduler.cancel_schedule("s1", created.id).unwrap());
        // Cancelling again, or a missing/not-owned id, reports false.
        assert!(!scheduler.cancel_schedule("s1", created.id).unwrap());
        assert!(!scheduler.cancel_schedule("s1", 9999).unwrap());

        let portal = FakePortal::new(true);
        let results = scheduler
            .check_and_execute_pending("s1", &portal)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(portal.attempt_count(), 0);
    }
}
