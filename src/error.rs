//! Error types for a3s-outbox

use thiserror::Error;

/// Errors that can occur while relaying outbox events
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Event log store failure (read or write)
    #[error("Store error: {0}")]
    Store(String),

    /// Message bus connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish failure
    #[error("Failed to publish event to subject '{subject}': {reason}")]
    Publish {
        subject: String,
        reason: String,
    },

    /// Publish aborted through its cancellation token
    #[error("Publish cancelled for event {0}")]
    Cancelled(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Event log entry not found
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Duplicate event id on append
    #[error("Event already exists: {0}")]
    AlreadyExists(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse failure
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Result type alias for outbox operations
pub type Result<T> = std::result::Result<T, OutboxError>;
