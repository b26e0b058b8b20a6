use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use notecue_core::types::{format_ts, new_id};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::{
    db::{init_db, row_to_log, LOG_SELECT_SQL},
    error::{NotifyError, Result},
    types::{NewNotificationLog, NotificationLog, NotificationStatus},
};

/// Delivery log persistence. One row per (trigger, device) attempt.
pub trait NotificationLogStore: Send + Sync {
    /// Insert a `pending` row and return its ID.
    fn create(&self, log: &NewNotificationLog) -> Result<String>;

    /// `pending` → `sent`, recording the provider's message ID.
    fn mark_sent(&self, id: &str, provider_message_id: &str) -> Result<()>;

    /// `pending` → `failed`, recording the error text.
    fn mark_failed(&self, id: &str, error: &str) -> Result<()>;

    /// `pending` → `cancelled`.
    fn cancel(&self, id: &str) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<NotificationLog>>;

    /// Most recent first.
    fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationLog>>;

    fn list_for_reminder(&self, reminder_id: &str) -> Result<Vec<NotificationLog>>;
}

/// SQLite-backed [`NotificationLogStore`].
#[derive(Clone)]
pub struct SqliteNotificationLogStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteNotificationLogStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| NotifyError::LockPoisoned)
    }

    /// Move a pending row to a final status. Rows that already left
    /// `pending` are reported, never overwritten.
    fn finish(
        &self,
        id: &str,
        status: NotificationStatus,
        provider_message_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = format_ts(&Utc::now());
        let sent_at = (status == NotificationStatus::Sent).then(|| now.clone());
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE notification_logs SET
                status = ?2, provider_message_id = ?3, error_message = ?4,
                sent_at = ?5, updated_at = ?6
             WHERE id = ?1 AND status = 'pending'",
            params![id, status.to_string(), provider_message_id, error, sent_at, now],
        )?;
        if n == 1 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM notification_logs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            Some(status) => Err(NotifyError::AlreadyFinal {
                id: id.to_string(),
                status,
            }),
            None => Err(NotifyError::NotFound { id: id.to_string() }),
        }
    }
}

impl NotificationLogStore for SqliteNotificationLogStore {
    #[instrument(skip(self, log), fields(user_id = %log.user_id, device_id = ?log.device_id))]
    fn create(&self, log: &NewNotificationLog) -> Result<String> {
        let id = new_id();
        let now = format_ts(&Utc::now());
        let data = serde_json::to_string(&log.data)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notification_logs
             (id, user_id, reminder_id, device_id, title, body, data, status,
              scheduled_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?9)",
            params![
                id,
                log.user_id,
                log.reminder_id,
                log.device_id,
                log.title,
                log.body,
                data,
                log.scheduled_at.as_ref().map(format_ts),
                now,
            ],
        )?;
        Ok(id)
    }

    fn mark_sent(&self, id: &str, provider_message_id: &str) -> Result<()> {
        self.finish(id, NotificationStatus::Sent, Some(provider_message_id), None)
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        self.finish(id, NotificationStatus::Failed, None, Some(error))
    }

    fn cancel(&self, id: &str) -> Result<()> {
        self.finish(id, NotificationStatus::Cancelled, None, None)
    }

    fn get(&self, id: &str) -> Result<Option<NotificationLog>> {
        let conn = self.conn()?;
        let log = conn
            .query_row(
                &format!("{LOG_SELECT_SQL} WHERE id = ?1"),
                params![id],
                row_to_log,
            )
            .optional()?;
        Ok(log)
    }

    fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<NotificationLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{LOG_SELECT_SQL} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))?;
        let logs = stmt
            .query_map(params![user_id, limit as i64], row_to_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn list_for_reminder(&self, reminder_id: &str) -> Result<Vec<NotificationLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{LOG_SELECT_SQL} WHERE reminder_id = ?1 ORDER BY created_at, id"
        ))?;
        let logs = stmt
            .query_map(params![reminder_id], row_to_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }
}
