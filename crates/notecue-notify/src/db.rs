use std::collections::BTreeMap;

use notecue_core::types::{parse_opt_ts, parse_ts};
use rusqlite::{types::Type, Connection, Row};

use crate::{
    error::Result,
    types::{NotificationLog, NotificationStatus},
};

pub(crate) const LOG_SELECT_SQL: &str = "SELECT id, user_id, reminder_id, device_id, title, body,
        data, status, error_message, provider_message_id, scheduled_at, sent_at,
        created_at, updated_at
     FROM notification_logs";

/// Initialise the notification log schema in `conn`.
///
/// `reminder_id` and `device_id` deliberately carry no foreign keys: a log
/// row must survive deletion of either.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notification_logs (
            id                  TEXT NOT NULL PRIMARY KEY,
            user_id             TEXT NOT NULL,
            reminder_id         TEXT,
            device_id           TEXT,
            title               TEXT NOT NULL,
            body                TEXT NOT NULL,
            data                TEXT NOT NULL DEFAULT '{}',   -- JSON object of strings
            status              TEXT NOT NULL DEFAULT 'pending',
            error_message       TEXT,
            provider_message_id TEXT,
            scheduled_at        TEXT,
            sent_at             TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_notification_logs_reminder
            ON notification_logs (reminder_id);
        CREATE INDEX IF NOT EXISTS idx_notification_logs_user
            ON notification_logs (user_id, created_at);
        ",
    )?;
    Ok(())
}

/// Map a row selected with [`LOG_SELECT_SQL`] to a [`NotificationLog`].
pub(crate) fn row_to_log(row: &Row<'_>) -> rusqlite::Result<NotificationLog> {
    let data: BTreeMap<String, String> =
        serde_json::from_str(&row.get::<_, String>(6)?).map_err(|e| conversion(6, e))?;
    let status: NotificationStatus = row
        .get::<_, String>(7)?
        .parse()
        .map_err(|e: String| conversion(7, e))?;
    let opt_ts = |idx: usize, raw: Option<String>| {
        parse_opt_ts(raw.as_deref()).map_err(|e| conversion(idx, e))
    };
    let ts = |idx: usize, raw: String| parse_ts(&raw).map_err(|e| conversion(idx, e));

    Ok(NotificationLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reminder_id: row.get(2)?,
        device_id: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        data,
        status,
        error_message: row.get(8)?,
        provider_message_id: row.get(9)?,
        scheduled_at: opt_ts(10, row.get(10)?)?,
        sent_at: opt_ts(11, row.get(11)?)?,
        created_at: ts(12, row.get(12)?)?,
        updated_at: ts(13, row.get(13)?)?,
    })
}

fn conversion(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}
