//! In-memory message bus for development and testing
//!
//! Records every accepted event and can be scripted to reject specific
//! events, or everything, to exercise the relay's failure paths.

use super::MessageBus;
use crate::error::{OutboxError, Result};
use crate::types::IntegrationEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-memory bus
#[derive(Default)]
pub struct MemoryBus {
    published: RwLock<Vec<IntegrationEvent>>,
    failing: RwLock<HashSet<Uuid>>,
    unavailable: RwLock<bool>,
    latency: Option<Duration>,
}

impl MemoryBus {
    /// Create a bus that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every publish by `latency` (cancellable)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject publishes of the given event until `heal_event` is called
    pub async fn fail_event(&self, event_id: Uuid) {
        self.failing.write().await.insert(event_id);
    }

    /// Stop rejecting the given event
    pub async fn heal_event(&self, event_id: Uuid) {
        self.failing.write().await.remove(&event_id);
    }

    /// Reject every publish while `unavailable` is true
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Events accepted so far, in publish order
    pub async fn published(&self) -> Vec<IntegrationEvent> {
        self.published.read().await.clone()
    }

    /// Number of events accepted so far
    pub async fn publish_count(&self) -> usize {
        self.published.read().await.len()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, event: &IntegrationEvent, cancel: &CancellationToken) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OutboxError::Cancelled(event.id.to_string()));
                }
                _ = tokio::time::sleep(latency) => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(OutboxError::Cancelled(event.id.to_string()));
        }

        if *self.unavailable.read().await {
            return Err(OutboxError::Connection("memory bus unavailable".to_string()));
        }

        if self.failing.read().await.contains(&event.id) {
            return Err(OutboxError::Publish {
                subject: event.event_type.clone(),
                reason: "rejected by memory bus".to_string(),
            });
        }

        self.published.write().await.push(event.clone());

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Event published"
        );

        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
