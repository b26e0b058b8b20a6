use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_BATCH_LIMIT: usize = 100;
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 10;

/// Top-level config (notecue.toml + NOTECUE_* env overrides).
///
/// Nested keys are addressed with a double underscore in the environment,
/// e.g. `NOTECUE_SCHEDULER__WORKER_COUNT=8`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotecueConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll cycles. Trigger precision equals this value.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Concurrent workers draining one poll cycle's batch.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Max due reminders taken per cycle; the rest wait for the next one.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            worker_count: DEFAULT_WORKER_COUNT,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Which push transport the daemon wires in as its notification sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PushTransport {
    /// Log every message instead of sending it. Useful for local runs.
    #[default]
    Log,
    /// POST each message as JSON to `push.webhook_url` (an FCM relay or similar).
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub transport: PushTransport,
    pub webhook_url: Option<String>,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub auth_token: Option<String>,
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            transport: PushTransport::default(),
            webhook_url: None,
            auth_token: None,
            timeout_secs: DEFAULT_PUSH_TIMEOUT_SECS,
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}
fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}
fn default_push_timeout_secs() -> u64 {
    DEFAULT_PUSH_TIMEOUT_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.notecue/notecue.db", home)
}

impl NotecueConfig {
    /// Load config from a TOML file with NOTECUE_* env var overrides.
    ///
    /// The file is the first of:
    ///   1. Explicit path argument
    ///   2. The NOTECUE_CONFIG env var
    ///   3. ~/.notecue/notecue.toml
    ///
    /// A missing file is not an error; defaults fill every absent key.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = resolve_config_path(config_path, std::env::var("NOTECUE_CONFIG").ok());

        Self::from_figment(
            Figment::from(Serialized::defaults(NotecueConfig::default()))
                .merge(Toml::file(&path))
                .merge(Env::prefixed("NOTECUE_").ignore(&["CONFIG"]).split("__")),
        )
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: NotecueConfig = figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_secs == 0 {
            return Err(CoreError::Config(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.scheduler.worker_count == 0 {
            return Err(CoreError::Config(
                "scheduler.worker_count must be positive".to_string(),
            ));
        }
        if self.scheduler.batch_limit == 0 {
            return Err(CoreError::Config(
                "scheduler.batch_limit must be positive".to_string(),
            ));
        }
        if self.push.transport == PushTransport::Webhook && self.push.webhook_url.is_none() {
            return Err(CoreError::Config(
                "push.webhook_url is required when push.transport = \"webhook\"".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&str>, from_env: Option<String>) -> String {
    explicit
        .map(String::from)
        .or(from_env.filter(|p| !p.is_empty()))
        .unwrap_or_else(default_config_path)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.notecue/notecue.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<NotecueConfig> {
        NotecueConfig::from_figment(
            Figment::from(Serialized::defaults(NotecueConfig::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let config = NotecueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.scheduler.worker_count, 5);
        assert_eq!(config.scheduler.batch_limit, 100);
        assert_eq!(config.push.transport, PushTransport::Log);
    }

    #[test]
    fn toml_overrides_scheduler_section() {
        let config = from_toml(
            r#"
            [scheduler]
            poll_interval_secs = 5
            worker_count = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval(), std::time::Duration::from_secs(5));
        assert_eq!(config.scheduler.worker_count, 2);
        assert_eq!(config.scheduler.batch_limit, DEFAULT_BATCH_LIMIT);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = from_toml("[scheduler]\nworker_count = 0\n").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn webhook_transport_requires_url() {
        assert!(from_toml("[push]\ntransport = \"webhook\"\n").is_err());
        let config = from_toml(
            "[push]\ntransport = \"webhook\"\nwebhook_url = \"http://localhost:9000/push\"\n",
        )
        .unwrap();
        assert_eq!(config.push.transport, PushTransport::Webhook);
    }

    #[test]
    fn config_path_precedence() {
        let env = Some("/etc/notecue/env.toml".to_string());
        assert_eq!(resolve_config_path(Some("cli.toml"), env.clone()), "cli.toml");
        assert_eq!(resolve_config_path(None, env), "/etc/notecue/env.toml");
        assert_eq!(resolve_config_path(None, Some(String::new())), default_config_path());
        assert_eq!(resolve_config_path(None, None), default_config_path());
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = std::env::temp_dir().join(format!("notecue-config-{}", crate::types::new_id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("notecue.toml");
        std::fs::write(&path, "[scheduler]
batch_limit = 7
").unwrap();

        let config = NotecueConfig::load(path.to_str()).unwrap();
        assert_eq!(config.scheduler.batch_limit, 7);

        let _ = std::fs::remove_dir_all(dir);
    }
}
