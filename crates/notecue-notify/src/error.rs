use thiserror::Error;

/// Errors a push transport can report for a single message.
#[derive(Debug, Error)]
pub enum SendError {
    /// The provider no longer recognises the device token.
    #[error("Token rejected: {0}")]
    InvalidToken(String),

    /// The provider answered but refused the message.
    #[error("Rejected by provider (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The request never reached the provider or the response was unreadable.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Send timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Notification log storage errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification log not found: {id}")]
    NotFound { id: String },

    /// Logs leave `pending` exactly once and never go back.
    #[error("Notification log {id} is already {status}")]
    AlreadyFinal { id: String, status: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification log store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, NotifyError>;
