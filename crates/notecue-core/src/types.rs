use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Generate a new primary key.
///
/// UUIDv7 embeds the creation time, so IDs sort in insertion order and are
/// easy to correlate across log lines.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Encode an instant the way every notecue table stores it.
///
/// Fixed millisecond precision plus a `Z` suffix keeps the strings the same
/// width, so `next_trigger_at <= ?` compares chronologically in SQLite.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode a timestamp column written by [`format_ts`] (any RFC 3339 offset is accepted).
pub fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Optional-column variant of [`parse_ts`].
pub fn parse_opt_ts(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_ts).transpose()
}
