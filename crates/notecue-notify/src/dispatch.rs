use std::collections::BTreeMap;
use std::sync::Arc;

use notecue_core::types::format_ts;
use notecue_devices::{Device, DeviceLookup};
use notecue_reminders::Reminder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    log_store::NotificationLogStore,
    sender::NotificationSender,
    types::{NewNotificationLog, PushMessage},
};

/// Body used when a reminder has no message of its own.
pub const DEFAULT_BODY: &str = "You have a reminder";

/// Outcome of one device's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent { provider_message_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResult {
    pub device_id: String,
    /// `None` when the log row itself could not be written.
    pub log_id: Option<String>,
    pub status: DeliveryStatus,
}

impl DeviceResult {
    pub fn is_sent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sent { .. })
    }
}

/// Reminder-level result of a fan-out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchOutcome {
    pub reminder_id: String,
    /// One entry per resolved device, in lookup order.
    pub results: Vec<DeviceResult>,
    /// Set when the device list could not be resolved at all.
    pub lookup_error: Option<String>,
}

impl DispatchOutcome {
    /// At least one device got the message, or there was nobody to notify.
    pub fn is_success(&self) -> bool {
        if self.lookup_error.is_some() {
            return false;
        }
        self.results.is_empty() || self.results.iter().any(DeviceResult::is_sent)
    }

    pub fn sent_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_sent()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.sent_count()
    }
}

/// Fans one reminder out to every active device of its owner.
///
/// Delivery is best-effort: each device is attempted independently and a
/// failure (send, log write, or last-used bump) never stops the remaining
/// devices. Nothing here returns an error; everything lands in the outcome.
#[derive(Clone)]
pub struct Dispatcher {
    devices: Arc<dyn DeviceLookup>,
    logs: Arc<dyn NotificationLogStore>,
    sender: Arc<dyn NotificationSender>,
}

impl Dispatcher {
    pub fn new(
        devices: Arc<dyn DeviceLookup>,
        logs: Arc<dyn NotificationLogStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            devices,
            logs,
            sender,
        }
    }

    pub async fn dispatch(&self, reminder: &Reminder) -> DispatchOutcome {
        let mut outcome = DispatchOutcome {
            reminder_id: reminder.id.clone(),
            ..Default::default()
        };

        let devices = match self.devices.active_devices_for_user(&reminder.user_id) {
            Ok(devices) => devices,
            Err(e) => {
                warn!(reminder_id = %reminder.id, user_id = %reminder.user_id, error = %e,
                    "device lookup failed; nothing sent");
                outcome.lookup_error = Some(e.to_string());
                return outcome;
            }
        };

        if devices.is_empty() {
            info!(reminder_id = %reminder.id, user_id = %reminder.user_id,
                "no active devices; skipping delivery");
            return outcome;
        }

        let body = if reminder.message.trim().is_empty() {
            DEFAULT_BODY.to_string()
        } else {
            reminder.message.clone()
        };
        let data = payload(reminder);

        for device in &devices {
            let result = self.deliver(reminder, device, &body, &data).await;
            outcome.results.push(result);
        }

        info!(
            reminder_id = %reminder.id,
            transport = self.sender.name(),
            devices = devices.len(),
            sent = outcome.sent_count(),
            failed = outcome.failed_count(),
            "reminder dispatched"
        );
        outcome
    }

    async fn deliver(
        &self,
        reminder: &Reminder,
        device: &Device,
        body: &str,
        data: &BTreeMap<String, String>,
    ) -> DeviceResult {
        let log_id = match self.logs.create(&NewNotificationLog {
            user_id: reminder.user_id.clone(),
            reminder_id: Some(reminder.id.clone()),
            device_id: Some(device.id.clone()),
            title: reminder.title.clone(),
            body: body.to_string(),
            data: data.clone(),
            scheduled_at: Some(reminder.next_trigger_at),
        }) {
            Ok(id) => Some(id),
            Err(e) => {
                // Still attempt the send; the log is bookkeeping, not a gate.
                warn!(reminder_id = %reminder.id, device_id = %device.id, error = %e,
                    "failed to create notification log");
                None
            }
        };

        let msg = PushMessage {
            token: device.token.clone(),
            title: reminder.title.clone(),
            body: body.to_string(),
            data: data.clone(),
        };

        match self.sender.send(&msg).await {
            Ok(receipt) => {
                debug!(reminder_id = %reminder.id, device_id = %device.id,
                    provider_message_id = %receipt.provider_message_id, "push accepted");
                if let Some(ref id) = log_id {
                    if let Err(e) = self.logs.mark_sent(id, &receipt.provider_message_id) {
                        warn!(log_id = %id, error = %e, "failed to mark notification sent");
                    }
                }
                if let Err(e) = self.devices.touch_last_used(&device.id) {
                    warn!(device_id = %device.id, error = %e, "failed to update device last_used_at");
                }
                DeviceResult {
                    device_id: device.id.clone(),
                    log_id,
                    status: DeliveryStatus::Sent {
                        provider_message_id: receipt.provider_message_id,
                    },
                }
            }
            Err(e) => {
                warn!(reminder_id = %reminder.id, device_id = %device.id, error = %e, "push failed");
                let error = e.to_string();
                if let Some(ref id) = log_id {
                    if let Err(e) = self.logs.mark_failed(id, &error) {
                        warn!(log_id = %id, error = %e, "failed to mark notification failed");
                    }
                }
                DeviceResult {
                    device_id: device.id.clone(),
                    log_id,
                    status: DeliveryStatus::Failed { error },
                }
            }
        }
    }
}

/// Data payload clients use to deep-link into the note.
fn payload(reminder: &Reminder) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("type".to_string(), "reminder".to_string()),
        ("reminder_id".to_string(), reminder.id.clone()),
        ("note_id".to_string(), reminder.note_id.clone()),
        ("trigger_at".to_string(), format_ts(&reminder.next_trigger_at)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SendError,
        log_store::SqliteNotificationLogStore,
        types::{NotificationStatus, SendReceipt},
    };
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use notecue_devices::{DeviceError, DeviceRegistry, Platform};
    use notecue_reminders::NewReminder;
    use rusqlite::Connection;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Accepts every token except the ones listed in `fail`.
    #[derive(Default)]
    struct ScriptedSender {
        fail: HashSet<String>,
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl NotificationSender for ScriptedSender {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(&self, msg: &PushMessage) -> Result<SendReceipt, SendError> {
            self.sent.lock().unwrap().push(msg.clone());
            if self.fail.contains(&msg.token) {
                return Err(SendError::InvalidToken(msg.token.clone()));
            }
            Ok(SendReceipt {
                provider_message_id: format!("msg-{}", msg.token),
            })
        }
    }

    struct BrokenLookup;

    impl DeviceLookup for BrokenLookup {
        fn active_devices_for_user(&self, _user_id: &str) -> notecue_devices::Result<Vec<Device>> {
            Err(DeviceError::LockPoisoned)
        }
        fn touch_last_used(&self, _device_id: &str) -> notecue_devices::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        registry: Arc<DeviceRegistry>,
        logs: Arc<SqliteNotificationLogStore>,
        sender: Arc<ScriptedSender>,
        dispatcher: Dispatcher,
    }

    fn fixture(fail: &[&str]) -> Fixture {
        let registry = Arc::new(DeviceRegistry::new(Connection::open_in_memory().unwrap()).unwrap());
        let logs = Arc::new(
            SqliteNotificationLogStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        );
        let sender = Arc::new(ScriptedSender {
            fail: fail.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(registry.clone(), logs.clone(), sender.clone());
        Fixture {
            registry,
            logs,
            sender,
            dispatcher,
        }
    }

    fn reminder(user: &str, message: &str) -> Reminder {
        let now = Utc::now();
        let mut input = NewReminder::once("note-7", user, "Call mom", now + Duration::hours(1));
        input.message = message.to_string();
        Reminder::new(input, now).unwrap()
    }

    #[tokio::test]
    async fn zero_devices_is_success_without_logs() {
        let f = fixture(&[]);
        let r = reminder("alice", "");
        let outcome = f.dispatcher.dispatch(&r).await;

        assert!(outcome.is_success());
        assert!(outcome.results.is_empty());
        assert!(f.logs.list_for_reminder(&r.id).unwrap().is_empty());
        assert!(f.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_is_success_with_one_log_per_device() {
        let f = fixture(&["bad-token"]);
        let good = f.registry.register("alice", "good-token", Platform::Android).unwrap();
        let bad = f.registry.register("alice", "bad-token", Platform::Ios).unwrap();
        let r = reminder("alice", "Sunday call");

        let outcome = f.dispatcher.dispatch(&r).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.sent_count(), 1);
        assert_eq!(outcome.failed_count(), 1);

        let logs = f.logs.list_for_reminder(&r.id).unwrap();
        assert_eq!(logs.len(), 2);
        let sent = logs.iter().find(|l| l.device_id.as_deref() == Some(good.id.as_str())).unwrap();
        let failed = logs.iter().find(|l| l.device_id.as_deref() == Some(bad.id.as_str())).unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert_eq!(sent.provider_message_id.as_deref(), Some("msg-good-token"));
        assert_eq!(failed.status, NotificationStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("bad-token"));

        // Only the successful device gets its last-used timestamp bumped.
        assert!(f.registry.get(&good.id).unwrap().unwrap().last_used_at.is_some());
        assert!(f.registry.get(&bad.id).unwrap().unwrap().last_used_at.is_none());
    }

    #[tokio::test]
    async fn early_failure_does_not_stop_later_devices() {
        let f = fixture(&["first"]);
        f.registry.register("alice", "first", Platform::Android).unwrap();
        f.registry.register("alice", "second", Platform::Android).unwrap();
        f.registry.register("alice", "third", Platform::Web).unwrap();

        let outcome = f.dispatcher.dispatch(&reminder("alice", "x")).await;
        assert_eq!(f.sender.sent.lock().unwrap().len(), 3);
        assert_eq!(outcome.sent_count(), 2);
    }

    #[tokio::test]
    async fn all_failed_is_failure() {
        let f = fixture(&["a", "b"]);
        f.registry.register("alice", "a", Platform::Android).unwrap();
        f.registry.register("alice", "b", Platform::Android).unwrap();

        let outcome = f.dispatcher.dispatch(&reminder("alice", "x")).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.failed_count(), 2);
    }

    #[tokio::test]
    async fn inactive_devices_are_skipped() {
        let f = fixture(&[]);
        let old = f.registry.register("alice", "old", Platform::Android).unwrap();
        f.registry.deactivate(&old.id).unwrap();

        let outcome = f.dispatcher.dispatch(&reminder("alice", "x")).await;
        assert!(outcome.results.is_empty());
        assert!(f.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_fallback_and_payload() {
        let f = fixture(&[]);
        f.registry.register("alice", "tok", Platform::Android).unwrap();
        let r = reminder("alice", "   ");

        f.dispatcher.dispatch(&r).await;
        let sent = f.sender.sent.lock().unwrap();
        assert_eq!(sent[0].title, "Call mom");
        assert_eq!(sent[0].body, DEFAULT_BODY);
        assert_eq!(sent[0].data["type"], "reminder");
        assert_eq!(sent[0].data["reminder_id"], r.id);
        assert_eq!(sent[0].data["note_id"], "note-7");
    }

    #[tokio::test]
    async fn lookup_failure_is_reported_not_thrown() {
        let logs = Arc::new(
            SqliteNotificationLogStore::new(Connection::open_in_memory().unwrap()).unwrap(),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(BrokenLookup),
            logs,
            Arc::new(ScriptedSender::default()),
        );
        let outcome = dispatcher.dispatch(&reminder("alice", "x")).await;
        assert!(!outcome.is_success());
        assert!(outcome.lookup_error.is_some());
    }
}
