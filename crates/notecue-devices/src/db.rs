use notecue_core::types::{parse_opt_ts, parse_ts};
use rusqlite::{types::Type, Connection, Result};

use crate::types::{Device, Platform};

pub(crate) const DEVICE_SELECT_SQL: &str = "SELECT id, user_id, token, platform, is_active,
        last_used_at, created_at, updated_at
     FROM devices";

/// Map a SELECT row (column order from DEVICE_SELECT_SQL) to a Device.
/// Centralised here so every query in this crate stays consistent.
pub(crate) fn row_to_device(row: &rusqlite::Row<'_>) -> Result<Device> {
    let platform: Platform = row
        .get::<_, String>(3)?
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let ts = |idx: usize, raw: String| {
        parse_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    };
    let last_used: Option<String> = row.get(5)?;
    Ok(Device {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: row.get(2)?,
        platform,
        is_active: row.get::<_, i64>(4)? != 0,
        last_used_at: parse_opt_ts(last_used.as_deref())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        created_at: ts(6, row.get(6)?)?,
        updated_at: ts(7, row.get(7)?)?,
    })
}

/// Initialise the devices table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    // UNIQUE(token): one row per physical install; re-registration moves it.
    // idx_devices_user_active serves the dispatcher's hot path.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS devices (
            id            TEXT PRIMARY KEY NOT NULL,
            user_id       TEXT NOT NULL,
            token         TEXT NOT NULL UNIQUE,
            platform      TEXT NOT NULL DEFAULT 'android',
            is_active     INTEGER NOT NULL DEFAULT 1,
            last_used_at  TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_devices_user_active
            ON devices (user_id, is_active);",
    )
}
