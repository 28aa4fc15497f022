use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutboxError, Result};
use crate::provider::nats::NatsConfig;

/// Retry and scheduling settings for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Failed attempts after which an entry is no longer retried (default: 5)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Delay between the end of one cycle and the start of the next (default: 120)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Budget for recording a failed attempt in the store (default: 10)
    #[serde(default = "default_failure_write_timeout_secs")]
    pub failure_write_timeout_secs: u64,

    /// Budget for marking an entry published after a successful publish (default: 10)
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// Budget for a single bus publish (default: 30)
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_retry_limit() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    120
}

fn default_failure_write_timeout_secs() -> u64 {
    10
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_publish_timeout_secs() -> u64 {
    30
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            poll_interval_secs: default_poll_interval_secs(),
            failure_write_timeout_secs: default_failure_write_timeout_secs(),
            ack_timeout_secs: default_ack_timeout_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Delay between cycles
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Bound on the write that records a failed attempt
    pub fn failure_write_timeout(&self) -> Duration {
        Duration::from_secs(self.failure_write_timeout_secs)
    }

    /// Bound on the write that marks an entry published
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Bound on a single bus publish
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retry_limit == 0 {
            return Err(OutboxError::Config(
                "retry_limit must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(OutboxError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("failure_write_timeout_secs", self.failure_write_timeout_secs),
            ("ack_timeout_secs", self.ack_timeout_secs),
            ("publish_timeout_secs", self.publish_timeout_secs),
        ] {
            if value == 0 {
                return Err(OutboxError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Location of the event log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("outbox/events.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Everything the `a3s-outbox-relay` process reads from its config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub nats: NatsConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.relay.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`.
    /// Returns default config if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                OutboxError::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
