use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery state of one (trigger, device) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Row written, send not yet finished.
    Pending,
    Sent,
    Failed,
    /// Withdrawn before the attempt completed.
    Cancelled,
}

impl NotificationStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// A persisted delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: String,
    pub user_id: String,
    /// Kept as a plain column so the log outlives the reminder.
    pub reminder_id: Option<String>,
    /// Kept as a plain column so the log outlives the device.
    pub device_id: Option<String>,
    pub title: String,
    pub body: String,
    /// Opaque key/value payload forwarded to the client.
    pub data: BTreeMap<String, String>,
    pub status: NotificationStatus,
    /// Set when `status` is `Failed`.
    pub error_message: Option<String>,
    /// Set when `status` is `Sent`.
    pub provider_message_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`crate::NotificationLogStore::create`]; rows always start `pending`.
#[derive(Debug, Clone, Default)]
pub struct NewNotificationLog {
    pub user_id: String,
    pub reminder_id: Option<String>,
    pub device_id: Option<String>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// One push message for one device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// What the transport hands back for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub provider_message_id: String,
}
