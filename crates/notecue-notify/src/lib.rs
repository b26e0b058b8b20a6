//! `notecue-notify` — fans a due reminder out to every active device of its
//! owner and keeps one delivery log row per attempt.
//!
//! The push transport itself is abstracted behind [`NotificationSender`];
//! the daemon decides which concrete sender is wired in.

pub mod db;
pub mod dispatch;
pub mod error;
pub mod log_store;
pub mod sender;
pub mod types;

pub use dispatch::{DeliveryStatus, DeviceResult, DispatchOutcome, Dispatcher};
pub use error::{NotifyError, Result, SendError};
pub use log_store::{NotificationLogStore, SqliteNotificationLogStore};
pub use sender::NotificationSender;
pub use types::{NewNotificationLog, NotificationLog, NotificationStatus, PushMessage, SendReceipt};
