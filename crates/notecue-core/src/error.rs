use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

impl CoreError {
    /// Short, stable error code for log correlation and API layers.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::InvalidTimestamp { .. } => "INVALID_TIMESTAMP",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_code() {
        let errors = [
            CoreError::Config("bad".into()),
            CoreError::InvalidTimestamp {
                value: "yesterday".into(),
                reason: "not RFC 3339".into(),
            },
        ];
        let codes: Vec<_> = errors.iter().map(CoreError::code).collect();
        assert_eq!(codes, ["CONFIG_ERROR", "INVALID_TIMESTAMP"]);
    }
}
