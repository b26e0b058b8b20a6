use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Push tokens from FCM / APNs / web push stay well below this.
pub const MAX_TOKEN_LEN: usize = 4096;

/// Client platform a push token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Android,
    Ios,
    Web,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
            Platform::Web => write!(f, "web"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = DeviceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            other => Err(DeviceError::InvalidPlatform(other.to_string())),
        }
    }
}

/// A user's push-capable device. Read-only from the dispatcher's side,
/// apart from the `last_used_at` bump after a successful delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    /// Opaque push token handed to the transport.
    pub token: String,
    pub platform: Platform,
    /// Inactive devices are never targeted.
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reject tokens that no push provider would accept.
///
/// A token must be non-empty, at most [`MAX_TOKEN_LEN`] bytes, and contain no
/// whitespace or control characters.
pub fn validate_token(token: &str) -> Result<(), DeviceError> {
    if token.is_empty() {
        return Err(DeviceError::InvalidToken("token is empty".to_string()));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(DeviceError::InvalidToken(format!(
            "token is {} bytes (max {MAX_TOKEN_LEN})",
            token.len()
        )));
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DeviceError::InvalidToken(
            "token contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fcm_style_token() {
        assert!(validate_token("dQw4w9WgXcQ:APA91bH-abc_123").is_ok());
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!(validate_token("").is_err());
        assert!(validate_token("abc def").is_err());
        assert!(validate_token("abc\ndef").is_err());
        assert!(validate_token(&"x".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn platform_round_trip() {
        for p in [Platform::Android, Platform::Ios, Platform::Web] {
            assert_eq!(p.to_string().parse::<Platform>().unwrap(), p);
        }
        assert!("symbian".parse::<Platform>().is_err());
    }
}
