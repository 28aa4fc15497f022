//! NATS JetStream message bus
//!
//! Implements `MessageBus` on top of JetStream publish acks. JetStream
//! gives at-least-once delivery; the event id doubles as the dedup key.

mod client;
mod config;

pub use client::NatsClient;
pub use config::{NatsConfig, StorageType};

use crate::error::{OutboxError, Result};
use crate::provider::MessageBus;
use crate::types::IntegrationEvent;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// NATS JetStream bus
///
/// Wraps `NatsClient` and implements the `MessageBus` trait.
pub struct NatsBus {
    client: NatsClient,
}

impl NatsBus {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying NATS client
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, event: &IntegrationEvent, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OutboxError::Cancelled(event.id.to_string())),
            result = self.client.publish(event) => result.map(|_| ()),
        }
    }

    fn name(&self) -> &str {
        "nats"
    }
}
