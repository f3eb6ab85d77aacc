//! Core check-and-attempt cycle for waitlist entries.

use crate::db::{NewLogEntry, LogAction, LogStatus, PortalSessionRecord, Store, WaitlistEntry};
use crate::notify::Mailer;
use crate::portal::{Portal, PortalError};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Classification of one entry's processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The section had room and the registration was confirmed.
    Registered,
    /// The section exists but reports no open seats.
    Full,
    /// The section is no longer listed for the course.
    NotFound,
    /// The portal declined or errored during the registration attempt.
    Failed,
    /// The availability check itself failed; the entry stays eligible.
    Error,
}

/// Per-entry result returned to the caller of a processing cycle.
#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    pub entry_id: i64,
    pub course_code: String,
    pub class_code: String,
    pub outcome: CheckOutcome,
    pub message: String,
}

/// Aggregate of one cycle over a single session's entries.
#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub processed: usize,
    pub registered: usize,
    pub results: Vec<EntryResult>,
}

/// Aggregate of one global sweep across all sessions.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub sessions: usize,
    pub processed: usize,
    pub registered: usize,
    pub results: Vec<EntryResult>,
}

/// Stateless batch engine: loads `waiting` entries, checks availability
/// through the portal, attempts registration, and records transitions as
/// conditional updates against the store.
pub struct WaitlistProcessor {
    store: Arc<Store>,
    period_id: String,
    mailer: Option<Arc<Mailer>>,
}

impl WaitlistProcessor {
    pub fn new(store: Arc<Store>, period_id: String, mailer: Option<Arc<Mailer>>) -> Self {
        Self {
            store,
            period_id,
            mailer,
        }
    }

    /// On-demand cycle over one session's `waiting` entries.
    ///
    /// Processes every waiting entry regardless of its advisory check
    /// interval — the user asked explicitly. Portal failures become
    /// per-entry outcomes; only store failures propagate.
    pub async fn process_session<P: Portal>(
        &self,
        session_id: &str,
        portal: &P,
    ) -> rusqlite::Result<CycleReport> {
        let entries = self.store.waiting_entries_for_session(session_id)?;
        debug!(entries = entries.len(), "starting on-demand waitlist cycle");
        self.process_entries(portal, entries).await
    }

    /// Global sweep: one cycle per session holding `waiting` entries, each
    /// with its own portal connection built by `connect`. A failure in one
    /// session's group never blocks the others.
    pub async fn run_sweep<P, F, Fut>(&self, connect: F) -> rusqlite::Result<SweepReport>
    where
        P: Portal,
        F: Fn(PortalSessionRecord) -> Fut,
        Fut: Future<Output = Result<P, PortalError>>,
    {
        let session_ids = self.store.sessions_with_waiting_entries()?;
        info!(sessions = session_ids.len(), "starting waitlist sweep");

        let mut report = SweepReport::default();
        for session_id in session_ids {
            report.sessions += 1;
            match self.sweep_session(&session_id, &connect).await {
                Ok(cycle) => {
                    report.processed += cycle.processed;
                    report.registered += cycle.registered;
                    report.results.extend(cycle.results);
                }
                Err(e) => {
                    error!(error = %e, "sweep failed for one session, continuing");
                }
            }
        }

        info!(
            sessions = report.sessions,
            processed = report.processed,
            registered = report.registered,
            "waitlist sweep finished"
        );
        Ok(report)
    }

    async fn sweep_session<P, F, Fut>(
        &self,
        session_id: &str,
        connect: &F,
    ) -> anyhow::Result<CycleReport>
    where
        P: Portal,
        F: Fn(PortalSessionRecord) -> Fut,
        Fut: Future<Output = Result<P, PortalError>>,
    {
        let Some(record) = self.store.get_portal_session(session_id)? else {
            debug!("no stored portal session, skipping");
            return Ok(CycleReport::default());
        };
        let portal = connect(record).await?;

        // The sweep honors the advisory check interval; entries checked
        // recently are left for a later pass.
        let now = Utc::now();
        let entries: Vec<_> = self
            .store
            .waiting_entries_for_session(session_id)?
            .into_iter()
            .filter(|e| e.is_due(now))
            .collect();

        Ok(self.process_entries(&portal, entries).await?)
    }

    async fn process_entries<P: Portal>(
        &self,
        portal: &P,
        entries: Vec<WaitlistEntry>,
    ) -> rusqlite::Result<CycleReport> {
        let mut report = CycleReport::default();
        for entry in entries {
            report.processed += 1;
            let (result, newly_registered) = self.process_one(portal, &entry).await?;
            if newly_registered {
                report.registered += 1;
            }
            report.results.push(result);
        }
        Ok(report)
    }

    /// One availability-check-and-attempt cycle for a single entry.
    ///
    /// Returns the per-entry result and whether this invocation won the
    /// conditional `waiting -> registered` update. Portal errors are folded
    /// into the result; store errors propagate.
    async fn process_one<P: Portal>(
        &self,
        portal: &P,
        entry: &WaitlistEntry,
    ) -> rusqlite::Result<(EntryResult, bool)> {
        // Unconditional, even when everything below fails: stale entries
        // must be visibly distinguishable from fresh ones.
        self.store.mark_entry_checked(entry.id, Utc::now())?;

        let sections = match portal
            .get_class_sections(&self.period_id, &entry.course_code)
            .await
        {
            Ok(sections) => sections,
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "availability check failed");
                return Ok((self.result(entry, CheckOutcome::Error, e.to_string()), false));
            }
        };

        let Some(section) = sections.into_iter().find(|s| s.id == entry.class_id) else {
            debug!(entry_id = entry.id, class_id = %entry.class_id, "section not listed");
            return Ok((
                self.result(
                    entry,
                    CheckOutcome::NotFound,
                    "section no longer listed for this course".to_string(),
                ),
                false,
            ));
        };

        if !section.open_for_registration {
            return Ok((
                self.result(
                    entry,
                    CheckOutcome::Full,
                    format!("section full ({:.0}% registered)", section.percent_registered),
                ),
                false,
            ));
        }

        // Open seat: attempt registration. The automated path carries no
        // human-verification token.
        match portal.register_for_class(&entry.class_id, None).await {
            Ok(outcome) if outcome.success => {
                let won = self.store.try_mark_registered(entry.id)?;
                if !won {
                    // Another invocation read `waiting` too and got there
                    // first; its cycle owns the log row and the counter.
                    debug!(entry_id = entry.id, "entry already registered by a concurrent run");
                    return Ok((
                        self.result(
                            entry,
                            CheckOutcome::Registered,
                            "already handled by a concurrent run".to_string(),
                        ),
                        false,
                    ));
                }
                info!(
                    entry_id = entry.id,
                    class_code = %entry.class_code,
                    "waitlisted registration succeeded"
                );
                let message = if outcome.message.is_empty() {
                    "registered".to_string()
                } else {
                    outcome.message
                };
                self.append_attempt_log(entry, LogStatus::Success, &message)?;
                self.notify_registered(entry).await;
                Ok((self.result(entry, CheckOutcome::Registered, message), true))
            }
            Ok(outcome) => {
                let message = if outcome.message.is_empty() {
                    "portal declined the registration".to_string()
                } else {
                    outcome.message
                };
                warn!(entry_id = entry.id, message = %message, "registration declined");
                self.append_attempt_log(entry, LogStatus::Failed, &message)?;
                Ok((self.result(entry, CheckOutcome::Failed, message), false))
            }
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "registration attempt errored");
                let message = e.to_string();
                self.append_attempt_log(entry, LogStatus::Failed, &message)?;
                Ok((self.result(entry, CheckOutcome::Failed, message), false))
            }
        }
    }

    fn result(&self, entry: &WaitlistEntry, outcome: CheckOutcome, message: String) -> EntryResult {
        EntryResult {
            entry_id: entry.id,
            course_code: entry.course_code.clone(),
            class_code: entry.class_code.clone(),
            outcome,
            message,
        }
    }

    /// Audit-log rows are written only for actual registration attempts;
    /// `not_found`/`full`/pre-attempt errors appear in the result list only.
    fn append_attempt_log(
        &self,
        entry: &WaitlistEntry,
        status: LogStatus,
        message: &str,
    ) -> rusqlite::Result<()> {
        self.store.append_log(&NewLogEntry {
            session_id: entry.session_id.clone(),
            action: LogAction::Register,
            course_code: entry.course_code.clone(),
            course_name: entry.course_name.clone(),
            class_code: entry.class_code.clone(),
            status,
            message: message.to_string(),
        })
    }

    async fn notify_registered(&self, entry: &WaitlistEntry) {
        let Some(mailer) = &self.mailer else { return };
        let notify_email = match self.store.get_portal_session(&entry.session_id) {
            Ok(Some(record)) => record.notify_email,
            _ => None,
        };
        let Some(to) = notify_email else { return };
        if let Err(e) = mailer
            .send_registration_notice(&to, &entry.course_name, &entry.class_code)
            .await
        {
            warn!(error = %e, "failed to send registration notification");
        }
    }
}
