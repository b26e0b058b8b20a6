//! `notecue-reminders` — the reminder entity, its recurrence math and storage.
//!
//! # Recurrence rules
//!
//! | Rule      | Next trigger after a fire at `now`                                  |
//! |-----------|---------------------------------------------------------------------|
//! | `Once`    | none; the reminder disables itself                                  |
//! | `Daily`   | tomorrow (or later) at the original time of day                     |
//! | `Weekly`  | first listed weekday from tomorrow on, at the original time of day  |
//! | `Monthly` | given day of next month, clamped to month end (`-1` = last day)     |
//!
//! All times are UTC. "Next" always means strictly after the reference instant.

pub mod db;
pub mod error;
pub mod recurrence;
pub mod store;
pub mod types;

pub use error::{ReminderError, Result};
pub use store::{ReminderStore, SqliteReminderStore};
pub use types::{
    AdvanceOutcome, MonthDay, NewReminder, Reminder, ReminderState, RepeatConfig, RepeatRule,
    RepeatType,
};
