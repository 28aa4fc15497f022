//! Relay loop — run select/publish cycles on a fixed delay
//!
//! The loop never overlaps cycles and never dies because a cycle failed:
//! cycle errors and panics are logged and the next cycle runs after the
//! usual delay. The delay is measured from the end of one cycle to the
//! start of the next.

use crate::config::RelayConfig;
use crate::error::Result;
use crate::pipeline::{CycleReport, PublishPipeline};
use crate::provider::MessageBus;
use crate::selector::EventSelector;
use crate::store::EventLogStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Store and bus handles for one cycle
///
/// Built fresh by a `ContextFactory` at the start of every cycle and
/// dropped when the cycle ends.
#[derive(Clone)]
pub struct RelayContext {
    pub store: Arc<dyn EventLogStore>,
    pub bus: Arc<dyn MessageBus>,
}

impl RelayContext {
    /// Bundle the handles for one cycle
    pub fn new(store: Arc<dyn EventLogStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }
}

/// Produces the per-cycle `RelayContext`
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Open the handles for one cycle; an error fails that cycle only
    async fn create(&self) -> Result<RelayContext>;
}

/// Factory that hands every cycle the same long-lived handles
///
/// Suitable when the store and bus are themselves pooled clients.
pub struct SharedContextFactory {
    context: RelayContext,
}

impl SharedContextFactory {
    /// Share `store` and `bus` across all cycles
    pub fn new(store: Arc<dyn EventLogStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            context: RelayContext::new(store, bus),
        }
    }
}

#[async_trait]
impl ContextFactory for SharedContextFactory {
    async fn create(&self) -> Result<RelayContext> {
        Ok(self.context.clone())
    }
}

/// Outbox relay
#[derive(Clone)]
pub struct OutboxRelay {
    factory: Arc<dyn ContextFactory>,
    selector: EventSelector,
    pipeline: PublishPipeline,
    poll_interval: Duration,
}

impl OutboxRelay {
    /// Create a relay that opens its per-cycle context through `factory`
    pub fn new(config: &RelayConfig, factory: impl ContextFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            selector: EventSelector::new(config.retry_limit),
            pipeline: PublishPipeline::new(config),
            poll_interval: config.poll_interval(),
        }
    }

    /// Delay between the end of one cycle and the start of the next
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one select/publish cycle
    ///
    /// Errors here are cycle-level: the context could not be built or the
    /// selection query failed. Per-entry errors are counted in the report.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let ctx = self.factory.create().await?;
        let entries = self.selector.select(ctx.store.as_ref()).await?;

        if entries.is_empty() {
            tracing::debug!("No outbox entries to publish");
            return Ok(CycleReport::default());
        }

        Ok(self.pipeline.run(&ctx, entries, shutdown).await)
    }

    /// Run cycles until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            retry_limit = self.selector.retry_limit(),
            "Outbox relay started"
        );

        while !shutdown.is_cancelled() {
            self.supervised_cycle(&shutdown).await;

            let delay = chrono::Duration::from_std(self.poll_interval)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let next_run = chrono::Local::now() + delay;
            tracing::info!(
                next_run = %next_run.format("%H:%M:%S"),
                "Next relay cycle scheduled"
            );

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Outbox relay stopped");
    }

    /// Run one cycle on its own task so a panic is contained like an error
    async fn supervised_cycle(&self, shutdown: &CancellationToken) {
        tracing::info!("Outbox relay cycle started");

        let relay = self.clone();
        let token = shutdown.clone();
        let cycle = tokio::spawn(async move { relay.run_cycle(&token).await });

        match cycle.await {
            Ok(Ok(report)) => tracing::info!(
                selected = report.selected,
                published = report.published,
                failed = report.failed,
                exhausted = report.exhausted,
                unrecorded = report.unrecorded,
                deferred = report.deferred,
                "Outbox relay cycle completed"
            ),
            Ok(Err(e)) => tracing::error!(error = %e, "Outbox relay cycle failed"),
            Err(e) => tracing::error!(error = %e, "Outbox relay cycle aborted"),
        }
    }

    /// Start the loop on a background task
    pub fn spawn(self) -> RelayHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        RelayHandle { shutdown, task }
    }
}

/// Start/stop control for a spawned relay
pub struct RelayHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Token that stops the relay when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the relay loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop and wait for the in-flight entry to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Outbox relay task failed");
        }
    }
}
