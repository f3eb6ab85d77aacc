//! The waitlist retry engine.
//!
//! A [`processor::WaitlistProcessor`] performs one availability-check-and-
//! attempt cycle per `waiting` entry. It holds no timers: recurrence is owned
//! by whatever triggers it — the on-demand `/waitlist/check` endpoint for one
//! session, or the `/cron/waitlist` sweep across every session.

pub mod processor;

pub use processor::{CheckOutcome, CycleReport, EntryResult, SweepReport, WaitlistProcessor};
