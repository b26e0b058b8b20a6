//! `notecue-scheduler` — polls for due reminders and drains them through a
//! bounded worker pool.
//!
//! # Cycle
//!
//! 1. [`ReminderStore::find_due`](notecue_reminders::ReminderStore::find_due)
//!    returns at most `batch_limit` enabled reminders with
//!    `next_trigger_at <= now`, oldest first.
//! 2. [`WorkerPool`] hands each one to exactly one of `worker_count` workers.
//! 3. Each worker dispatches, advances the schedule and saves, in that order.
//!    Delivery failures never stop the schedule from advancing.
//! 4. The cycle ends when every worker is done. Reminders past the limit wait
//!    for the next cycle.

pub mod engine;
pub mod error;
pub mod processor;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use engine::{CycleReport, ReminderScheduler};
pub use error::{Result, SchedulerError};
pub use processor::{ProcessReport, Processor};
pub use worker::{BatchReport, WorkerPool};
