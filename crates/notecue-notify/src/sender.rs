use async_trait::async_trait;

use crate::{
    error::SendError,
    types::{PushMessage, SendReceipt},
};

/// Common interface implemented by every push transport (FCM relay, log sink, …).
///
/// Implementations must be `Send + Sync` so one instance can be shared by all
/// scheduler workers.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Stable lowercase identifier for this transport (e.g. `"webhook"`).
    fn name(&self) -> &str;

    /// Deliver one message to one device token.
    ///
    /// Returns once the provider has accepted or refused the message; a
    /// send is never cancelled midway by the caller.
    async fn send(&self, msg: &PushMessage) -> Result<SendReceipt, SendError>;
}
