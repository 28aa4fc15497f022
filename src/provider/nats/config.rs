//! NATS JetStream bus configuration

use serde::{Deserialize, Serialize};

/// JetStream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Persist messages on disk
    #[default]
    File,
    /// Keep messages in server memory
    Memory,
}

/// Connection and stream settings for `NatsBus`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// JetStream stream that receives relayed events
    pub stream_name: String,

    /// Subject prefix; events go to `<prefix>.<event_type>`
    pub subject_prefix: String,

    /// Stream storage backend
    pub storage: StorageType,

    /// Maximum messages retained by the stream (-1 = unlimited)
    pub max_events: i64,

    /// Maximum message age in seconds (0 = unlimited)
    pub max_age_secs: u64,

    /// Maximum stream size in bytes (-1 = unlimited)
    pub max_bytes: i64,

    /// JetStream deduplication window in seconds
    ///
    /// Re-publishes of the same event id inside this window are dropped by
    /// the server.
    pub duplicate_window_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "OUTBOX_EVENTS".to_string(),
            subject_prefix: "outbox".to_string(),
            storage: StorageType::File,
            max_events: -1,
            max_age_secs: 7 * 24 * 3600,
            max_bytes: -1,
            duplicate_window_secs: 600,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            token: None,
        }
    }
}

impl NatsConfig {
    /// Subjects bound to the stream
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![format!("{}.>", self.subject_prefix)]
    }
}
