//! SQLite-backed stores for waitlist entries, scheduled registrations,
//! the registration audit log, and stored portal sessions.
//!
//! Every status transition is a conditional `UPDATE ... WHERE status = ...`
//! and the affected-row count is surfaced to the caller: a zero-row update
//! means another invocation already handled the record, not an error. This
//! is the one concurrency control the processing engines rely on.

mod types;

pub use types::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../../../sql/init.sql");

pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database at `db_path` and applies the schema.
    /// Pass `":memory:"` for an ephemeral store.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // ---- portal sessions ----

    /// Inserts or refreshes the stored portal credential for a session.
    pub fn upsert_portal_session(&self, record: &PortalSessionRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO portal_sessions
                 (session_id, student_code, access_token, notify_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                 student_code = excluded.student_code,
                 access_token = excluded.access_token,
                 notify_email = excluded.notify_email,
                 updated_at = excluded.updated_at",
            params![
                record.session_id,
                record.student_code,
                record.access_token,
                record.notify_email,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_portal_session(&self, session_id: &str) -> Result<Option<PortalSessionRecord>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT session_id, student_code, access_token, notify_email, created_at, updated_at
             FROM portal_sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(PortalSessionRecord {
                    session_id: row.get(0)?,
                    student_code: row.get(1)?,
                    access_token: row.get(2)?,
                    notify_email: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()
    }

    // ---- waitlist entries ----

    pub fn insert_waitlist_entry(&self, new: &NewWaitlistEntry) -> Result<WaitlistEntry> {
        let id = {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO waitlist_entries
                     (session_id, course_code, course_name, class_id, class_code,
                      priority, status, check_interval_secs, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'waiting', ?7, ?8)",
                params![
                    new.session_id,
                    new.course_code,
                    new.course_name,
                    new.class_id,
                    new.class_code,
                    new.priority,
                    new.check_interval_secs,
                    Utc::now(),
                ],
            )?;
            db.last_insert_rowid()
        };
        // The row was just inserted, so this lookup cannot miss.
        Ok(self.get_waitlist_entry(id)?.expect("inserted row missing"))
    }

    pub fn get_waitlist_entry(&self, id: i64) -> Result<Option<WaitlistEntry>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("{WAITLIST_SELECT} WHERE id = ?1"),
            params![id],
            map_waitlist_row,
        )
        .optional()
    }

    /// All entries owned by a session, newest first (for display).
    pub fn waitlist_for_session(&self, session_id: &str) -> Result<Vec<WaitlistEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{WAITLIST_SELECT} WHERE session_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![session_id], map_waitlist_row)?;
        rows.collect()
    }

    /// The session's `waiting` entries in processing order: priority
    /// ascending, then creation time ascending.
    pub fn waiting_entries_for_session(&self, session_id: &str) -> Result<Vec<WaitlistEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{WAITLIST_SELECT} WHERE session_id = ?1 AND status = 'waiting'
             ORDER BY priority ASC, created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![session_id], map_waitlist_row)?;
        rows.collect()
    }

    /// Every session that currently has at least one `waiting` entry.
    pub fn sessions_with_waiting_entries(&self) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT DISTINCT session_id FROM waitlist_entries
             WHERE status = 'waiting' ORDER BY session_id",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Records that an availability check happened, regardless of outcome.
    pub fn mark_entry_checked(&self, id: i64, checked_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE waitlist_entries SET last_checked_at = ?1 WHERE id = ?2",
            params![checked_at, id],
        )?;
        Ok(())
    }

    /// Transitions `waiting -> registered`. Returns false when the entry was
    /// no longer `waiting`, i.e. another invocation already handled it.
    pub fn try_mark_registered(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE waitlist_entries SET status = 'registered'
             WHERE id = ?1 AND status = 'waiting'",
            params![id],
        )?;
        Ok(rows == 1)
    }

    /// Transitions `waiting -> cancelled` for an entry owned by the given
    /// session. Returns false if the entry does not exist, is not owned by
    /// the session, or is already terminal.
    pub fn cancel_waitlist_entry(&self, session_id: &str, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE waitlist_entries SET status = 'cancelled'
             WHERE id = ?1 AND session_id = ?2 AND status = 'waiting'",
            params![id, session_id],
        )?;
        Ok(rows == 1)
    }

    // ---- registration log ----

    pub fn append_log(&self, new: &NewLogEntry) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO registration_log
                 (session_id, action, course_code, course_name, class_code,
                  status, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.session_id,
                new.action,
                new.course_code,
                new.course_name,
                new.class_code,
                new.status,
                new.message,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn logs_for_session(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<RegistrationLogEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, action, course_code, course_name, class_code,
                    status, message, created_at
             FROM registration_log WHERE session_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit], |row| {
            Ok(RegistrationLogEntry {
                id: row.get(0)?,
                session_id: row.get(1)?,
                action: row.get(2)?,
                course_code: row.get(3)?,
                course_name: row.get(4)?,
                class_code: row.get(5)?,
                status: row.get(6)?,
                message: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    // ---- scheduled registrations ----

    /// Inserts a new `pending` schedule unless the session already holds a
    /// pending one for the same class. The guard lives inside the insert
    /// statement itself, so two overlapping inserts cannot both pass it;
    /// `None` means the duplicate refused the insert.
    pub fn try_insert_schedule(
        &self,
        new: &NewScheduledRegistration,
    ) -> Result<Option<ScheduledRegistration>> {
        let id = {
            let db = self.db.lock().unwrap();
            let rows = db.execute(
                "INSERT INTO scheduled_registrations
                     (session_id, course_code, course_name, class_id, class_code,
                      fire_at, max_attempts, attempt_count, status, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 'pending', ?8
                 WHERE NOT EXISTS (
                     SELECT 1 FROM scheduled_registrations
                     WHERE session_id = ?1 AND class_id = ?4 AND status = 'pending')",
                params![
                    new.session_id,
                    new.course_code,
                    new.course_name,
                    new.class_id,
                    new.class_code,
                    new.fire_at,
                    new.max_attempts,
                    Utc::now(),
                ],
            )?;
            if rows == 0 {
                return Ok(None);
            }
            db.last_insert_rowid()
        };
        Ok(Some(self.get_schedule(id)?.expect("inserted row missing")))
    }

    pub fn get_schedule(&self, id: i64) -> Result<Option<ScheduledRegistration>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("{SCHEDULE_SELECT} WHERE id = ?1"),
            params![id],
            map_schedule_row,
        )
        .optional()
    }

    /// All of the session's schedules, newest first (for display).
    pub fn schedules_for_session(&self, session_id: &str) -> Result<Vec<ScheduledRegistration>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{SCHEDULE_SELECT} WHERE session_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![session_id], map_schedule_row)?;
        rows.collect()
    }

    /// Pending schedules whose fire time has passed and whose attempt budget
    /// is not exhausted.
    pub fn due_schedules_for_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledRegistration>> {
        let pending = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(&format!(
                "{SCHEDULE_SELECT}
                 WHERE session_id = ?1 AND status = 'pending'
                       AND attempt_count < max_attempts
                 ORDER BY fire_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![session_id], map_schedule_row)?;
            rows.collect::<Result<Vec<_>>>()?
        };
        Ok(pending.into_iter().filter(|s| s.fire_at <= now).collect())
    }

    /// Transitions `pending -> succeeded`. Returns false when the schedule
    /// was no longer pending.
    pub fn try_mark_schedule_succeeded(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE scheduled_registrations SET status = 'succeeded'
             WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(rows == 1)
    }

    /// Records a failed attempt: increments the attempt count and flips the
    /// schedule to `failed` once the count reaches the maximum. Returns the
    /// status after the update.
    pub fn record_schedule_failure(&self, id: i64) -> Result<ScheduleStatus> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE scheduled_registrations
             SET attempt_count = attempt_count + 1,
                 status = CASE WHEN attempt_count + 1 >= max_attempts
                               THEN 'failed' ELSE 'pending' END
             WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        db.query_row(
            "SELECT status FROM scheduled_registrations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
    }

    /// Transitions `pending -> cancelled` for a schedule owned by the given
    /// session. Returns false if it does not exist, is not owned, or is
    /// already terminal.
    pub fn cancel_schedule(&self, session_id: &str, id: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "UPDATE scheduled_registrations SET status = 'cancelled'
             WHERE id = ?1 AND session_id = ?2 AND status = 'pending'",
            params![id, session_id],
        )?;
        Ok(rows == 1)
    }
}

const WAITLIST_SELECT: &str =
    "SELECT id, session_id, course_code, course_name, class_id, class_code,
            priority, status, check_interval_secs, last_checked_at, created_at
     FROM waitlist_entries";

const SCHEDULE_SELECT: &str =
    "SELECT id, session_id, course_code, course_name, class_id, class_code,
            fire_at, max_attempts, attempt_count, status, created_at
     FROM scheduled_registrations";

fn map_waitlist_row(row: &Row<'_>) -> Result<WaitlistEntry> {
    Ok(WaitlistEntry {
        id: row.get(0)?,
        session_id: row.get(1)?,
        course_code: row.get(2)?,
        course_name: row.get(3)?,
        class_id: row.get(4)?,
        class_code: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        check_interval_secs: row.get(8)?,
        last_checked_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_schedule_row(row: &Row<'_>) -> Result<ScheduledRegistration> {
    Ok(ScheduledRegistration {
        id: row.get(0)?,
        session_id: row.get(1)?,
        course_code: row.get(2)?,
        course_name: row.get(3)?,
        class_id: row.get(4)?,
        class_code: row.get(5)?,
        fire_at: row.get(6)?,
        max_attempts: row.get(7)?,
        attempt_count: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_entry(session: &str, class_id: &str, priority: i64) -> NewWaitlistEntry {
        NewWaitlistEntry {
            session_id: session.to_string(),
            course_code: "CSE101".to_string(),
            course_name: "Intro".to_string(),
            class_id: class_id.to_string(),
            class_code: format!("CSE101.{class_id}"),
            priority,
            check_interval_secs: 300,
        }
    }

    fn new_schedule(session: &str, class_id: &str, fire_at: DateTime<Utc>) -> NewScheduledRegistration {
        NewScheduledRegistration {
            session_id: session.to_string(),
            course_code: "CSE101".to_string(),
            course_name: "Intro".to_string(),
            class_id: class_id.to_string(),
            class_code: format!("CSE101.{class_id}"),
            fire_at,
            max_attempts: 2,
        }
    }

    #[test]
    fn test_waiting_entries_ordered_by_priority_then_creation() {
        let store = Store::open(":memory:").unwrap();
        let a = store.insert_waitlist_entry(&new_entry("s1", "a", 5)).unwrap();
        let b = store.insert_waitlist_entry(&new_entry("s1", "b", 1)).unwrap();
        let c = store.insert_waitlist_entry(&new_entry("s1", "c", 1)).unwrap();

        let waiting = store.waiting_entries_for_session("s1").unwrap();
        let ids: Vec<_> = waiting.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
    }

    #[test]
    fn test_registered_entry_excluded_from_waiting_selection() {
        let store = Store::open(":memory:").unwrap();
        let e = store.insert_waitlist_entry(&new_entry("s1", "a", 0)).unwrap();

        assert!(store.try_mark_registered(e.id).unwrap());
        assert!(store.waiting_entries_for_session("s1").unwrap().is_empty());
        // Terminal: the conditional update does not fire a second time.
        assert!(!store.try_mark_registered(e.id).unwrap());

        let entry = store.get_waitlist_entry(e.id).unwrap().unwrap();
        assert_eq!(entry.status, WaitlistStatus::Registered);
    }

    #[test]
    fn test_cancel_requires_ownership() {
        let store = Store::open(":memory:").unwrap();
        let e = store.insert_waitlist_entry(&new_entry("s1", "a", 0)).unwrap();

        assert!(!store.cancel_waitlist_entry("s2", e.id).unwrap());
        assert_eq!(
            store.get_waitlist_entry(e.id).unwrap().unwrap().status,
            WaitlistStatus::Waiting
        );
        assert!(store.cancel_waitlist_entry("s1", e.id).unwrap());
        // Already terminal.
        assert!(!store.cancel_waitlist_entry("s1", e.id).unwrap());
    }

    #[test]
    fn test_sessions_with_waiting_entries() {
        let store = Store::open(":memory:").unwrap();
        store.insert_waitlist_entry(&new_entry("s1", "a", 0)).unwrap();
        store.insert_waitlist_entry(&new_entry("s1", "b", 0)).unwrap();
        let e = store.insert_waitlist_entry(&new_entry("s2", "c", 0)).unwrap();
        store.try_mark_registered(e.id).unwrap();

        assert_eq!(store.sessions_with_waiting_entries().unwrap(), vec!["s1"]);
    }

    #[test]
    fn test_mark_checked_is_unconditional() {
        let store = Store::open(":memory:").unwrap();
        let e = store.insert_waitlist_entry(&new_entry("s1", "a", 0)).unwrap();
        assert!(e.last_checked_at.is_none());
        assert!(e.is_due(Utc::now()));

        let now = Utc::now();
        store.mark_entry_checked(e.id, now).unwrap();
        let entry = store.get_waitlist_entry(e.id).unwrap().unwrap();
        assert_eq!(entry.last_checked_at.unwrap(), now);
        assert!(!entry.is_due(now + Duration::seconds(10)));
        assert!(entry.is_due(now + Duration::seconds(301)));
    }

    #[test]
    fn test_due_schedule_selection() {
        let store = Store::open(":memory:").unwrap();
        let now = Utc::now();
        let past = store
            .try_insert_schedule(&new_schedule("s1", "a", now - Duration::minutes(5)))
            .unwrap()
            .unwrap();
        store
            .try_insert_schedule(&new_schedule("s1", "b", now + Duration::minutes(5)))
            .unwrap()
            .unwrap();

        let due = store.due_schedules_for_session("s1", now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);
    }

    #[test]
    fn test_schedule_failure_flips_to_failed_at_max() {
        let store = Store::open(":memory:").unwrap();
        let s = store
            .try_insert_schedule(&new_schedule("s1", "a", Utc::now() - Duration::minutes(1)))
            .unwrap()
            .unwrap();
        assert_eq!(s.max_attempts, 2);

        assert_eq!(store.record_schedule_failure(s.id).unwrap(), ScheduleStatus::Pending);
        assert_eq!(store.record_schedule_failure(s.id).unwrap(), ScheduleStatus::Failed);

        // Exhausted schedules are never due again.
        assert!(store.due_schedules_for_session("s1", Utc::now()).unwrap().is_empty());
        let s = store.get_schedule(s.id).unwrap().unwrap();
        assert_eq!(s.attempt_count, 2);
    }

    #[test]
    fn test_cancelled_schedule_ineligible_even_if_due() {
        let store = Store::open(":memory:").unwrap();
        let s = store
            .try_insert_schedule(&new_schedule("s1", "a", Utc::now() - Duration::minutes(1)))
            .unwrap()
            .unwrap();

        assert!(store.cancel_schedule("s1", s.id).unwrap());
        assert!(store.due_schedules_for_session("s1", Utc::now()).unwrap().is_empty());
        // Terminal: cancelling again, succeeding, or failing all refuse.
        assert!(!store.cancel_schedule("s1", s.id).unwrap());
        assert!(!store.try_mark_schedule_succeeded(s.id).unwrap());
        assert_eq!(store.record_schedule_failure(s.id).unwrap(), ScheduleStatus::Cancelled);
    }

    #[test]
    fn test_insert_refuses_pending_duplicate_in_one_statement() {
        let store = Store::open(":memory:").unwrap();
        let s = store
            .try_insert_schedule(&new_schedule("s1", "a", Utc::now()))
            .unwrap()
            .unwrap();
        // Same session and class while one is pending: the insert itself
        // refuses, so no check-then-insert window exists.
        assert!(store
            .try_insert_schedule(&new_schedule("s1", "a", Utc::now()))
            .unwrap()
            .is_none());
        // A different class, or a different session, is unaffected.
        assert!(store
            .try_insert_schedule(&new_schedule("s1", "b", Utc::now()))
            .unwrap()
            .is_some());
        assert!(store
            .try_insert_schedule(&new_schedule("s2", "a", Utc::now()))
            .unwrap()
            .is_some());

        // Once the pending schedule is terminal the class is schedulable again.
        store.cancel_schedule("s1", s.id).unwrap();
        assert!(store
            .try_insert_schedule(&new_schedule("s1", "a", Utc::now()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_log_append_and_listing() {
        let store = Store::open(":memory:").unwrap();
        for i in 0..3 {
            store
                .append_log(&NewLogEntry {
                    session_id: "s1".to_string(),
                    action: LogAction::Register,
                    course_code: "CSE101".to_string(),
                    course_name: "Intro".to_string(),
                    class_code: format!("CSE101.{i}"),
                    status: if i == 2 { LogStatus::Success } else { LogStatus::Failed },
                    message: "test".to_string(),
                })
                .unwrap();
        }

        let logs = store.logs_for_session("s1", 10).unwrap();
        assert_eq!(logs.len(), 3);
        // Newest first.
        assert_eq!(logs[0].class_code, "CSE101.2");
        assert_eq!(logs[0].status, LogStatus::Success);
        assert!(store.logs_for_session("s2", 10).unwrap().is_empty());
        assert_eq!(store.logs_for_session("s1", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_portal_session_roundtrip() {
        let store = Store::open(":memory:").unwrap();
        let now = Utc::now();
        let mut record = PortalSessionRecord {
            session_id: "sess".to_string(),
            student_code: "SV001".to_string(),
            access_token: "tok1".to_string(),
            notify_email: None,
            created_at: now,
            updated_at: now,
        };
        store.upsert_portal_session(&record).unwrap();
        let loaded = store.get_portal_session("sess").unwrap().unwrap();
        assert_eq!(loaded.access_token, "tok1");

        record.access_token = "tok2".to_string();
        record.notify_email = Some("sv001@st.example.edu.vn".to_string());
        store.upsert_portal_session(&record).unwrap();
        let loaded = store.get_portal_session("sess").unwrap().unwrap();
        assert_eq!(loaded.access_token, "tok2");
        assert!(loaded.notify_email.is_some());
        assert!(store.get_portal_session("other").unwrap().is_none());
    }
}
