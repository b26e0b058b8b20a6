use std::time::Duration;

use async_trait::async_trait;
use notecue_core::config::PushConfig;
use notecue_core::types::new_id;
use notecue_notify::{NotificationSender, PushMessage, SendError, SendReceipt};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Writes every message to the log instead of delivering it.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, msg: &PushMessage) -> Result<SendReceipt, SendError> {
        info!(
            token = %redact(&msg.token),
            title = %msg.title,
            body = %msg.body,
            data = ?msg.data,
            "push (log transport)"
        );
        Ok(SendReceipt {
            provider_message_id: format!("log-{}", new_id()),
        })
    }
}

/// POSTs each message as JSON to a relay endpoint (FCM proxy or similar).
///
/// 404 and 410 mean the relay no longer knows the token; any other non-2xx
/// status is a plain rejection.
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct RelayResponse {
    message_id: Option<String>,
    /// FCM v1 answers with the message resource name.
    name: Option<String>,
}

impl WebhookSender {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
            timeout,
        })
    }

    pub fn from_config(config: &PushConfig) -> Result<Self, SendError> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| SendError::Transport("push.webhook_url is not set".into()))?;
        Self::new(url, config.auth_token.clone(), Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, msg: &PushMessage) -> Result<SendReceipt, SendError> {
        debug!(url = %self.url, token = %redact(&msg.token), "posting push message");

        let mut req = self.client.post(&self.url).json(msg);
        if let Some(ref token) = self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SendError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                }
            } else {
                SendError::Transport(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "push relay refused message");
            if status == 404 || status == 410 {
                return Err(SendError::InvalidToken(format!(
                    "{} ({status})",
                    redact(&msg.token)
                )));
            }
            return Err(SendError::Rejected {
                status,
                reason: text,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        let provider_message_id = serde_json::from_str::<RelayResponse>(&text)
            .ok()
            .and_then(|r| r.message_id.or(r.name))
            .unwrap_or_else(|| format!("webhook-{}", new_id()));
        Ok(SendReceipt {
            provider_message_id,
        })
    }
}

/// Device tokens are credentials; only a short prefix goes into logs.
fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}
