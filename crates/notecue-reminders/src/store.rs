use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use notecue_core::types::format_ts;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::{init_db, row_to_reminder, REMINDER_SELECT_SQL},
    error::{ReminderError, Result},
    types::Reminder,
};

/// Persistence boundary for reminders, shared by the scheduler and its workers.
///
/// Implementations must tolerate concurrent calls from several workers; each
/// worker only ever writes the single reminder it was handed.
pub trait ReminderStore: Send + Sync {
    /// Enabled reminders with `next_trigger_at <= now`, oldest first, at most `limit`.
    fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>>;

    /// Persist every mutable field of an existing reminder.
    fn save(&self, reminder: &Reminder) -> Result<()>;

    /// Bump `trigger_count` in place without loading the row.
    fn increment_trigger_count(&self, id: &str) -> Result<()>;

    fn insert(&self, reminder: &Reminder) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Reminder>>;

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Reminder>>;

    fn delete(&self, id: &str) -> Result<()>;
}

/// SQLite-backed [`ReminderStore`].
///
/// Uses its own `Connection` so the scheduler's polling queries never
/// contend with other subsystems for a shared handle.
#[derive(Clone)]
pub struct SqliteReminderStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteReminderStore {
    /// Wrap a connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ReminderError::LockPoisoned)
    }
}

impl ReminderStore for SqliteReminderStore {
    /// Unreadable rows are disabled as they are found and the query is
    /// repeated, so they can never hold batch slots ahead of valid reminders.
    #[instrument(skip(self), fields(now = %now))]
    fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let now_str = format_ts(&now);
        loop {
            let mut stmt = conn.prepare_cached(&format!(
                "{REMINDER_SELECT_SQL}
                 WHERE is_enabled = 1 AND next_trigger_at <= ?1
                 ORDER BY next_trigger_at
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now_str, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row_to_reminder(row)))
            })?;

            let mut due = Vec::new();
            let mut corrupt = Vec::new();
            for row in rows {
                match row? {
                    (_, Ok(reminder)) => due.push(reminder),
                    (id, Err(e)) => {
                        warn!(reminder_id = %id, error = %e, "disabling unreadable reminder row");
                        corrupt.push(id);
                    }
                }
            }
            drop(stmt);

            if corrupt.is_empty() {
                debug!(count = due.len(), limit, "due reminders loaded");
                return Ok(due);
            }
            for id in &corrupt {
                conn.execute(
                    "UPDATE reminders SET is_enabled = 0, updated_at = ?2 WHERE id = ?1",
                    params![id, now_str],
                )?;
            }
        }
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    fn save(&self, reminder: &Reminder) -> Result<()> {
        let config_json = serde_json::to_string(&reminder.repeat.to_config())?;
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE reminders SET
                title=?2, message=?3, scheduled_at=?4, next_trigger_at=?5,
                last_triggered_at=?6, trigger_count=?7, repeat_type=?8,
                repeat_config=?9, repeat_end_at=?10, is_enabled=?11, updated_at=?12
             WHERE id=?1",
            params![
                reminder.id,
                reminder.title,
                reminder.message,
                format_ts(&reminder.scheduled_at),
                format_ts(&reminder.next_trigger_at),
                reminder.last_triggered_at.as_ref().map(format_ts),
                reminder.trigger_count,
                reminder.repeat.repeat_type().to_string(),
                config_json,
                reminder.repeat_end_at.as_ref().map(format_ts),
                reminder.is_enabled,
                format_ts(&reminder.updated_at),
            ],
        )?;
        if n == 0 {
            return Err(ReminderError::NotFound {
                id: reminder.id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn increment_trigger_count(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE reminders SET trigger_count = trigger_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![id, format_ts(&Utc::now())],
        )?;
        if n == 0 {
            return Err(ReminderError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    fn insert(&self, reminder: &Reminder) -> Result<()> {
        let config_json = serde_json::to_string(&reminder.repeat.to_config())?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reminders
             (id, note_id, user_id, title, message, scheduled_at, next_trigger_at,
              last_triggered_at, trigger_count, repeat_type, repeat_config,
              repeat_end_at, is_enabled, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                reminder.id,
                reminder.note_id,
                reminder.user_id,
                reminder.title,
                reminder.message,
                format_ts(&reminder.scheduled_at),
                format_ts(&reminder.next_trigger_at),
                reminder.last_triggered_at.as_ref().map(format_ts),
                reminder.trigger_count,
                reminder.repeat.repeat_type().to_string(),
                config_json,
                reminder.repeat_end_at.as_ref().map(format_ts),
                reminder.is_enabled,
                format_ts(&reminder.created_at),
                format_ts(&reminder.updated_at),
            ],
        )?;
        info!(user_id = %reminder.user_id, next = %reminder.next_trigger_at, "reminder stored");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Reminder>> {
        let conn = self.conn()?;
        let reminder = conn
            .query_row(
                &format!("{REMINDER_SELECT_SQL} WHERE id = ?1"),
                params![id],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{REMINDER_SELECT_SQL} WHERE user_id = ?1 ORDER BY next_trigger_at"
        ))?;
        let reminders = stmt
            .query_map(params![user_id], row_to_reminder)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reminders)
    }

    #[instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM reminders WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(ReminderError::NotFound { id: id.to_string() });
        }
        info!(reminder_id = %id, "reminder deleted");
        Ok(())
    }
}
