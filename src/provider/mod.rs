//! Message bus trait — the core abstraction for publish backends
//!
//! All bus backends (NATS, in-memory, etc.) implement `MessageBus`. The
//! relay assumes at-least-once semantics and treats every error as
//! retryable; transient and permanent failures are not distinguished.

use crate::error::Result;
use crate::types::IntegrationEvent;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub mod nats;

/// Publish side of a message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one event
    ///
    /// Implementations should stop waiting and return an error once
    /// `cancel` fires. A successful return means the bus accepted the
    /// message; it may still be delivered more than once downstream.
    async fn publish(&self, event: &IntegrationEvent, cancel: &CancellationToken) -> Result<()>;

    /// Bus name (e.g., "nats", "memory")
    fn name(&self) -> &str;
}

/// Build a bus subject from a prefix and an event type
///
/// `::` separators are folded into `.` so Rust-style type paths map onto
/// subject tokens (e.g., `billing::InvoiceIssued` → `events.billing.InvoiceIssued`).
pub fn event_subject(prefix: &str, event_type: &str) -> String {
    let event_type = event_type.replace("::", ".");
    let event_type = event_type.trim_matches('.');
    if prefix.is_empty() {
        event_type.to_string()
    } else {
        format!("{}.{}", prefix, event_type)
    }
}
