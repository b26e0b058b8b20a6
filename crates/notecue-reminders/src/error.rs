use thiserror::Error;

/// Errors raised by reminder validation and the reminder store.
#[derive(Debug, Error)]
pub enum ReminderError {
    /// A new reminder must be scheduled strictly in the future.
    #[error("Invalid schedule time: {0}")]
    InvalidScheduleTime(String),

    /// The repeat type is not one of once/daily/weekly/monthly.
    #[error("Invalid repeat type: {0}")]
    InvalidRepeatType(String),

    /// The repeat configuration does not fit its repeat type.
    #[error("Invalid repeat config: {0}")]
    InvalidRepeatConfig(String),

    #[error("Invalid snooze duration: {0}")]
    InvalidSnoozeDuration(String),

    #[error("Reminder not found: {id}")]
    NotFound { id: String },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A thread panicked while holding the store connection.
    #[error("Reminder store lock poisoned")]
    LockPoisoned,
}

impl ReminderError {
    /// True for errors caused by caller input rather than storage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReminderError::InvalidScheduleTime(_)
                | ReminderError::InvalidRepeatType(_)
                | ReminderError::InvalidRepeatConfig(_)
                | ReminderError::InvalidSnoozeDuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReminderError>;
