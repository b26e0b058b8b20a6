use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use notecue_notify::{DispatchOutcome, Dispatcher};
use notecue_reminders::{AdvanceOutcome, Reminder, ReminderStore};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SchedulerError};

/// What happened to one reminder during a trigger.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub reminder_id: String,
    pub dispatch: DispatchOutcome,
    pub advance: AdvanceOutcome,
    /// False when the advanced state could not be persisted. The reminder
    /// is then still due and will be picked up again by a later poll.
    pub saved: bool,
}

/// The dispatch → advance → persist sequence, shared by pool workers and
/// manual triggers.
///
/// Every reminder being processed is registered in an in-flight set for
/// the duration of the sequence, so a manual trigger and a poll cycle can
/// never work on the same reminder at once.
pub struct Processor {
    store: Arc<dyn ReminderStore>,
    dispatcher: Dispatcher,
    in_flight: DashSet<String>,
}

/// Releases the in-flight claim on drop, including on panic.
pub(crate) struct InFlightGuard<'a> {
    set: &'a DashSet<String>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl Processor {
    pub fn new(store: Arc<dyn ReminderStore>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            dispatcher,
            in_flight: DashSet::new(),
        }
    }

    pub fn is_in_flight(&self, reminder_id: &str) -> bool {
        self.in_flight.contains(reminder_id)
    }

    pub(crate) fn claim(&self, reminder_id: &str) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .insert(reminder_id.to_string())
            .then(|| InFlightGuard {
                set: &self.in_flight,
                id: reminder_id.to_string(),
            })
    }

    /// Process a reminder handed out by a poll cycle.
    ///
    /// The poll result is only a hint. Once the claim is held the reminder is
    /// reloaded, and it runs only if the stored copy is still due. Returns
    /// `None` when it is in flight elsewhere, was advanced or removed since
    /// the poll, or could not be reloaded. A later poll picks up the last case.
    pub async fn process_due(&self, reminder: Reminder) -> Option<ProcessReport> {
        let Some(_guard) = self.claim(&reminder.id) else {
            debug!(reminder_id = %reminder.id, "reminder already in flight; skipping");
            return None;
        };
        let fresh = match self.store.get(&reminder.id) {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                debug!(reminder_id = %reminder.id, "reminder deleted since poll; skipping");
                return None;
            }
            Err(e) => {
                warn!(reminder_id = %reminder.id, error = %e, "failed to reload reminder; skipping");
                return None;
            }
        };
        if !fresh.is_due(Utc::now()) {
            debug!(reminder_id = %fresh.id, "reminder no longer due; skipping");
            return None;
        }
        Some(self.run(fresh).await)
    }

    /// Load a reminder by ID and process it immediately, bypassing the poll
    /// cycle. Works on disabled or not-yet-due reminders too.
    #[instrument(skip(self))]
    pub async fn trigger_now(&self, reminder_id: &str) -> Result<ProcessReport> {
        let _guard = self
            .claim(reminder_id)
            .ok_or_else(|| SchedulerError::AlreadyInFlight {
                id: reminder_id.to_string(),
            })?;
        let reminder = self
            .store
            .get(reminder_id)?
            .ok_or_else(|| SchedulerError::NotFound {
                id: reminder_id.to_string(),
            })?;
        info!(reminder_id, "manual trigger");
        Ok(self.run(reminder).await)
    }

    async fn run(&self, mut reminder: Reminder) -> ProcessReport {
        let dispatch = self.dispatcher.dispatch(&reminder).await;
        if !dispatch.is_success() {
            warn!(
                reminder_id = %reminder.id,
                failed = dispatch.failed_count(),
                lookup_error = ?dispatch.lookup_error,
                "notification delivery failed; advancing schedule anyway"
            );
        }

        let advance = reminder.advance_after_trigger(Utc::now());
        match advance {
            AdvanceOutcome::Rescheduled(next) => {
                debug!(reminder_id = %reminder.id, next_trigger_at = %next, "reminder rescheduled");
            }
            AdvanceOutcome::Completed => {
                debug!(reminder_id = %reminder.id, "one-shot reminder completed");
            }
            AdvanceOutcome::Exhausted(next) => {
                info!(reminder_id = %reminder.id, next_trigger_at = %next, "recurrence ended");
            }
        }

        let saved = match self.store.save(&reminder) {
            Ok(()) => true,
            Err(e) => {
                warn!(reminder_id = %reminder.id, error = %e,
                    "failed to persist advanced reminder; it will be retried next cycle");
                false
            }
        };

        ProcessReport {
            reminder_id: reminder.id,
            dispatch,
            advance,
            saved,
        }
    }
}
