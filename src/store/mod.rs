//! Event log store trait — the relay's view of the outbox table
//!
//! The business transaction appends entries; the relay only queries by
//! status and flips status/attempt counters. Each of the four operations is
//! expected to be durable and transactional at the single-entry level.

use crate::error::{OutboxError, Result};
use crate::types::EventLogEntry;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub mod file;
pub mod memory;

/// Storage backend for the outbox event log
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// All entries with status `Pending`, oldest first
    async fn list_pending(&self) -> Result<Vec<EventLogEntry>>;

    /// All `PublishFailed` entries whose attempt count is below `retry_limit`
    async fn list_failed_below_retry_limit(&self, retry_limit: u32) -> Result<Vec<EventLogEntry>>;

    /// Mark an entry as `Published`
    ///
    /// `timeout` is a budget the backend may apply to its own call (e.g.
    /// a statement timeout). The relay enforces it independently.
    async fn mark_published(&self, event_id: Uuid, timeout: Duration) -> Result<()>;

    /// Mark an entry as `PublishFailed` and increment its attempt count
    async fn mark_failed(&self, event_id: Uuid, timeout: Duration) -> Result<()>;

    /// Backend name (e.g., "memory", "file")
    fn name(&self) -> &str;
}

/// Run `fut`, failing with `OutboxError::Timeout` if it exceeds `timeout`
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(OutboxError::Timeout(format!(
            "{} exceeded {}ms",
            operation,
            timeout.as_millis()
        ))),
    }
}
