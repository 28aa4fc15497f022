//! # a3s-outbox
//!
//! Transactional outbox relay for the A3S ecosystem.
//!
//! ## Overview
//!
//! Services record integration events in an event log in the same durable
//! write as their business change. `a3s-outbox` periodically scans that log,
//! publishes each pending event to a message bus, and records the outcome.
//! Delivery is at-least-once: an event whose acknowledgement write fails is
//! published again on a later cycle.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_outbox::{
//!     EventLogEntry, IntegrationEvent, MemoryBus, MemoryEventLogStore, OutboxRelay,
//!     RelayConfig, SharedContextFactory,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> a3s_outbox::Result<()> {
//! let store = Arc::new(MemoryEventLogStore::new());
//! let bus = Arc::new(MemoryBus::new());
//!
//! // Written by the business transaction
//! let event = IntegrationEvent::new("orders.OrderPlaced", serde_json::json!({"orderId": 42}));
//! store.append(EventLogEntry::new(event, "tx-1001")).await?;
//!
//! let relay = OutboxRelay::new(
//!     &RelayConfig::default(),
//!     SharedContextFactory::new(store.clone(), bus.clone()),
//! );
//! let report = relay.run_cycle(&CancellationToken::new()).await?;
//! assert_eq!(report.published, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventLogStore** trait — the outbox table (memory and JSON-file backends)
//! - **MessageBus** trait — publish target (memory and NATS JetStream backends)
//! - **EventSelector** — pending entries first, then retryable failures
//! - **PublishPipeline** — per-entry publish + acknowledge, failures isolated
//! - **OutboxRelay** — fixed-delay loop with cooperative shutdown

pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod relay;
pub mod selector;
pub mod store;
pub mod types;

// Re-export core types
pub use config::{AppConfig, RelayConfig, StoreConfig};
pub use error::{OutboxError, Result};
pub use pipeline::{CycleReport, PublishPipeline};
pub use provider::MessageBus;
pub use relay::{ContextFactory, OutboxRelay, RelayContext, RelayHandle, SharedContextFactory};
pub use selector::EventSelector;
pub use store::EventLogStore;
pub use types::{EventLogEntry, EventStatus, IntegrationEvent};

// Re-export backends for convenience
pub use provider::memory::MemoryBus;
pub use provider::nats::{NatsBus, NatsClient, NatsConfig, StorageType};
pub use store::file::FileEventLogStore;
pub use store::memory::MemoryEventLogStore;
