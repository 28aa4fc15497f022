//! NATS JetStream client — connect, ensure stream, publish

use super::config::{NatsConfig, StorageType};
use crate::error::{OutboxError, Result};
use crate::provider::event_subject;
use crate::types::IntegrationEvent;
use async_nats::jetstream;
use std::time::Duration;

/// Header JetStream uses to deduplicate re-published messages
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// NATS JetStream client
///
/// Owns the connection and makes sure the relay's stream exists.
pub struct NatsClient {
    /// JetStream context
    jetstream: jetstream::Context,

    /// Configuration
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| OutboxError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client);
        ensure_stream(&jetstream, &config).await?;

        Ok(Self { jetstream, config })
    }

    /// Publish an event and wait for the JetStream ack
    ///
    /// The event id is sent as `Nats-Msg-Id`, so a re-delivery after a lost
    /// acknowledgement inside the duplicate window is dropped server-side.
    /// Returns the stream sequence.
    pub async fn publish(&self, event: &IntegrationEvent) -> Result<u64> {
        let subject = event_subject(&self.config.subject_prefix, &event.event_type);
        let payload = serde_json::to_vec(event)?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(MSG_ID_HEADER, event.id.to_string().as_str());

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, bytes::Bytes::from(payload))
            .await
            .map_err(|e| OutboxError::Publish {
                subject: subject.clone(),
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| OutboxError::Publish {
                subject: subject.clone(),
                reason: format!("ack failed: {}", e),
            })?;

        tracing::debug!(
            event_id = %event.id,
            subject = %subject,
            sequence = ack.sequence,
            duplicate = ack.duplicate,
            "Event published"
        );

        Ok(ack.sequence)
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the JetStream stream exists with the correct configuration
async fn ensure_stream(js: &jetstream::Context, config: &NatsConfig) -> Result<()> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.stream_subjects(),
        storage,
        max_messages: config.max_events,
        max_age: Duration::from_secs(config.max_age_secs),
        max_bytes: config.max_bytes,
        duplicate_window: Duration::from_secs(config.duplicate_window_secs),
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    js.get_or_create_stream(stream_config).await.map_err(|e| {
        OutboxError::Connection(format!(
            "Failed to create/get stream '{}': {}",
            config.stream_name, e
        ))
    })?;

    tracing::info!(
        stream = %config.stream_name,
        subjects = ?config.stream_subjects(),
        "JetStream stream ready"
    );

    Ok(())
}
