use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use notecue_core::types::{format_ts, new_id};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::db::{init_db, row_to_device, DEVICE_SELECT_SQL};
use crate::error::{DeviceError, Result};
use crate::types::{validate_token, Device, Platform};

/// What notification dispatch needs to know about devices.
pub trait DeviceLookup: Send + Sync {
    /// Every active device registered to `user_id`. An empty list is normal.
    fn active_devices_for_user(&self, user_id: &str) -> Result<Vec<Device>>;

    /// Record a successful delivery to `device_id`.
    fn touch_last_used(&self, device_id: &str) -> Result<()>;
}

/// SQLite-backed device registry.
///
/// Registration is keyed by push token: the same install re-registering
/// (possibly after a different user signs in) updates the existing row.
#[derive(Clone)]
pub struct DeviceRegistry {
    db: Arc<Mutex<Connection>>,
}

impl DeviceRegistry {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| DeviceError::LockPoisoned)
    }

    /// Register (or re-activate) a push token for `user_id`.
    #[instrument(skip(self, token))]
    pub fn register(&self, user_id: &str, token: &str, platform: Platform) -> Result<Device> {
        validate_token(token)?;
        let now = format_ts(&Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO devices (id, user_id, token, platform, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
             ON CONFLICT(token) DO UPDATE SET
                user_id    = excluded.user_id,
                platform   = excluded.platform,
                is_active  = 1,
                updated_at = excluded.updated_at",
            params![new_id(), user_id, token, platform.to_string(), now],
        )?;
        let device = conn.query_row(
            &format!("{DEVICE_SELECT_SQL} WHERE token = ?1"),
            params![token],
            row_to_device,
        )?;
        info!(device_id = %device.id, "device registered");
        Ok(device)
    }

    /// Stop targeting a device (e.g. after the provider reports the token as unregistered).
    #[instrument(skip(self))]
    pub fn deactivate(&self, device_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE devices SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![device_id, format_ts(&Utc::now())],
        )?;
        if n == 0 {
            return Err(DeviceError::NotFound(device_id.to_string()));
        }
        info!("device deactivated");
        Ok(())
    }

    /// Load a device by primary key. Returns None instead of an error when absent.
    pub fn get(&self, device_id: &str) -> Result<Option<Device>> {
        let conn = self.conn()?;
        let device = conn
            .query_row(
                &format!("{DEVICE_SELECT_SQL} WHERE id = ?1"),
                params![device_id],
                row_to_device,
            )
            .optional()?;
        Ok(device)
    }
}

impl DeviceLookup for DeviceRegistry {
    fn active_devices_for_user(&self, user_id: &str) -> Result<Vec<Device>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{DEVICE_SELECT_SQL} WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at"
        ))?;
        let devices = stmt
            .query_map(params![user_id], row_to_device)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(user_id, count = devices.len(), "active devices resolved");
        Ok(devices)
    }

    fn touch_last_used(&self, device_id: &str) -> Result<()> {
        let now = format_ts(&Utc::now());
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE devices SET last_used_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![device_id, now],
        )?;
        if n == 0 {
            return Err(DeviceError::NotFound(device_id.to_string()));
        }
        Ok(())
    }
}
