use notecue_reminders::ReminderError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Worker count, batch limit or poll interval is zero.
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// The reminder is already being processed by a worker or another manual trigger.
    #[error("Reminder already in flight: {id}")]
    AlreadyInFlight { id: String },

    #[error("Reminder not found: {id}")]
    NotFound { id: String },

    /// Reminder store failure (find-due query, load, save).
    #[error("Store error: {0}")]
    Store(#[from] ReminderError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
