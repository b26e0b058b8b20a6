use thiserror::Error;

/// All device-layer errors. Kept separate from the notify errors so the
/// dispatcher can record a lookup failure without coupling the layers.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Push tokens are validated before they are stored.
    #[error("Invalid device token: {0}")]
    InvalidToken(String),

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Device registry lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, DeviceError>;
