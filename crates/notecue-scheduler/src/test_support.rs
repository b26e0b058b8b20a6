//! Shared fixtures for the scheduler unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use notecue_devices::{DeviceRegistry, Platform};
use notecue_notify::{
    Dispatcher, NotificationSender, PushMessage, SendError, SendReceipt,
    SqliteNotificationLogStore,
};
use notecue_reminders::{NewReminder, Reminder, ReminderError, ReminderStore, SqliteReminderStore};
use rusqlite::Connection;

use crate::processor::Processor;

pub(crate) struct CountingSender {
    fail: bool,
    pub sent: AtomicUsize,
}

#[async_trait]
impl NotificationSender for CountingSender {
    fn name(&self) -> &str {
        "counting"
    }

    async fn send(&self, msg: &PushMessage) -> Result<SendReceipt, SendError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail {
            return Err(SendError::Transport("connection refused".into()));
        }
        Ok(SendReceipt {
            provider_message_id: format!("m-{}", msg.token),
        })
    }
}

pub(crate) struct Harness {
    pub reminders: Arc<SqliteReminderStore>,
    pub devices: Arc<DeviceRegistry>,
    pub logs: Arc<SqliteNotificationLogStore>,
    pub sender: Arc<CountingSender>,
    pub dispatcher: Dispatcher,
    pub processor: Arc<Processor>,
}

impl Harness {
    pub fn new(fail_sends: bool) -> Self {
        let reminders =
            Arc::new(SqliteReminderStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let devices = Arc::new(DeviceRegistry::new(Connection::open_in_memory().unwrap()).unwrap());
        let logs = Arc::new(
            SqliteNotificationLogStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        );
        let sender = Arc::new(CountingSender {
            fail: fail_sends,
            sent: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(devices.clone(), logs.clone(), sender.clone());
        let processor = Arc::new(Processor::new(reminders.clone(), dispatcher.clone()));
        Self {
            reminders,
            devices,
            logs,
            sender,
            dispatcher,
            processor,
        }
    }

    pub fn device(&self, user: &str, token: &str) {
        self.devices.register(user, token, Platform::Android).unwrap();
    }

    pub fn sent(&self) -> usize {
        self.sender.sent.load(Ordering::SeqCst)
    }
}

/// Reads from SQLite but refuses every `save`.
pub(crate) struct SaveFailingStore {
    inner: Arc<SqliteReminderStore>,
}

impl SaveFailingStore {
    pub fn new(inner: Arc<SqliteReminderStore>) -> Self {
        Self { inner }
    }
}

impl ReminderStore for SaveFailingStore {
    fn find_due(&self, now: DateTime<Utc>, limit: usize) -> notecue_reminders::Result<Vec<Reminder>> {
        self.inner.find_due(now, limit)
    }
    fn save(&self, _reminder: &Reminder) -> notecue_reminders::Result<()> {
        Err(ReminderError::LockPoisoned)
    }
    fn increment_trigger_count(&self, id: &str) -> notecue_reminders::Result<()> {
        self.inner.increment_trigger_count(id)
    }
    fn insert(&self, reminder: &Reminder) -> notecue_reminders::Result<()> {
        self.inner.insert(reminder)
    }
    fn get(&self, id: &str) -> notecue_reminders::Result<Option<Reminder>> {
        self.inner.get(id)
    }
    fn list_for_user(&self, user_id: &str) -> notecue_reminders::Result<Vec<Reminder>> {
        self.inner.list_for_user(user_id)
    }
    fn delete(&self, id: &str) -> notecue_reminders::Result<()> {
        self.inner.delete(id)
    }
}

/// A one-shot reminder whose trigger time passed a minute ago.
pub(crate) fn due_reminder(user: &str) -> Reminder {
    let now = Utc::now();
    let input = NewReminder::once("note-1", user, "Water the plants", now - Duration::minutes(1));
    Reminder::new(input, now - Duration::hours(1)).unwrap()
}
