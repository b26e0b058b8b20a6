use chrono::{DateTime, Utc};
use notecue_core::types::{parse_opt_ts, parse_ts};
use rusqlite::{types::Type, Connection, Row};

use crate::{
    error::Result,
    types::{Reminder, RepeatConfig, RepeatRule},
};

/// Column order shared by every reminder SELECT; see [`row_to_reminder`].
pub(crate) const REMINDER_SELECT_SQL: &str = "SELECT id, note_id, user_id, title, message,
        scheduled_at, next_trigger_at, last_triggered_at, trigger_count,
        repeat_type, repeat_config, repeat_end_at, is_enabled, created_at, updated_at
     FROM reminders";

/// Initialise the reminders schema in `conn`.
///
/// Creates the `reminders` table (idempotent) and the index the due-reminder
/// poll relies on: `WHERE is_enabled = 1 AND next_trigger_at <= ?`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                TEXT    NOT NULL PRIMARY KEY,
            note_id           TEXT    NOT NULL,
            user_id           TEXT    NOT NULL,
            title             TEXT    NOT NULL DEFAULT '',
            message           TEXT    NOT NULL DEFAULT '',
            scheduled_at      TEXT    NOT NULL,
            next_trigger_at   TEXT    NOT NULL,
            last_triggered_at TEXT,
            trigger_count     INTEGER NOT NULL DEFAULT 0,
            repeat_type       TEXT    NOT NULL DEFAULT 'once',
            repeat_config     TEXT    NOT NULL DEFAULT '{}',  -- JSON RepeatConfig
            repeat_end_at     TEXT,
            is_enabled        INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_due
            ON reminders (is_enabled, next_trigger_at);
        CREATE INDEX IF NOT EXISTS idx_reminders_user
            ON reminders (user_id);
        ",
    )?;
    Ok(())
}

/// Map a row selected with [`REMINDER_SELECT_SQL`] to a [`Reminder`].
///
/// Malformed timestamps or repeat configs surface as conversion errors so
/// the caller can skip the row instead of scheduling garbage.
pub(crate) fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let repeat_type: String = row.get(9)?;
    let config_json: String = row.get(10)?;
    let config: RepeatConfig = serde_json::from_str(&config_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    let repeat = RepeatRule::from_parts(&repeat_type, &config)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(Reminder {
        id: row.get(0)?,
        note_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        scheduled_at: ts_col(row, 5)?,
        next_trigger_at: ts_col(row, 6)?,
        last_triggered_at: opt_ts_col(row, 7)?,
        trigger_count: row.get(8)?,
        repeat,
        repeat_end_at: opt_ts_col(row, 11)?,
        is_enabled: row.get::<_, i64>(12)? != 0,
        created_at: ts_col(row, 13)?,
        updated_at: ts_col(row, 14)?,
    })
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    parse_opt_ts(raw.as_deref())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
