//! Publish pipeline — deliver selected entries and record the outcome
//!
//! Each entry goes through a two-step protocol: publish to the bus, then
//! mark `Published` in the store. The two steps are not atomic. If the
//! publish succeeds and the acknowledgement write fails, the entry is
//! recorded as failed and will be published again on a later cycle, so
//! consumers see it at least once and possibly twice.
//!
//! Entries are processed one at a time. Any error for an entry, including
//! a failure to record that error, is contained to that entry.

use crate::config::RelayConfig;
use crate::error::{OutboxError, Result};
use crate::relay::RelayContext;
use crate::store::with_timeout;
use crate::types::EventLogEntry;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long a timed-out publish may take to unwind after its token is cancelled
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Outcome counters for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries handed to the pipeline
    pub selected: usize,
    /// Entries published and acknowledged
    pub published: usize,
    /// Entries whose attempt failed
    pub failed: usize,
    /// Failed entries that just used their last allowed attempt
    pub exhausted: usize,
    /// Failed entries whose failure could not be recorded
    pub unrecorded: usize,
    /// Entries left untouched because shutdown was requested
    pub deferred: usize,
}

impl CycleReport {
    /// Whether the cycle had nothing to do
    pub fn is_idle(&self) -> bool {
        self.selected == 0
    }
}

/// Per-entry publish + acknowledge with bounded failure recording
#[derive(Debug, Clone, Copy)]
pub struct PublishPipeline {
    retry_limit: u32,
    publish_timeout: Duration,
    ack_timeout: Duration,
    failure_write_timeout: Duration,
}

impl PublishPipeline {
    /// Build a pipeline from the relay's retry limit and timeouts
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            retry_limit: config.retry_limit,
            publish_timeout: config.publish_timeout(),
            ack_timeout: config.ack_timeout(),
            failure_write_timeout: config.failure_write_timeout(),
        }
    }

    /// Process `entries` in order
    ///
    /// `shutdown` is checked between entries only: the entry being published
    /// when it fires is finished, the rest are left for the next run.
    pub async fn run(
        &self,
        ctx: &RelayContext,
        entries: Vec<EventLogEntry>,
        shutdown: &CancellationToken,
    ) -> CycleReport {
        let mut report = CycleReport {
            selected: entries.len(),
            ..Default::default()
        };

        for (idx, entry) in entries.iter().enumerate() {
            if shutdown.is_cancelled() {
                report.deferred = entries.len() - idx;
                tracing::info!(
                    deferred = report.deferred,
                    "Shutdown requested, deferring remaining entries"
                );
                break;
            }

            match self.deliver(ctx, entry).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        event_id = %entry.event_id,
                        type_name = %entry.type_name,
                        transaction_id = %entry.transaction_id,
                        attempt = entry.attempt_count + 1,
                        error = %e,
                        "Failed to publish event"
                    );

                    if !self.record_failure(ctx, entry).await {
                        report.unrecorded += 1;
                    } else if entry.attempt_count + 1 >= self.retry_limit {
                        report.exhausted += 1;
                        tracing::warn!(
                            event_id = %entry.event_id,
                            type_name = %entry.type_name,
                            transaction_id = %entry.transaction_id,
                            retry_limit = self.retry_limit,
                            "Retry limit reached, event will no longer be published"
                        );
                    }
                }
            }
        }

        report
    }

    /// Publish one entry and mark it published
    async fn deliver(&self, ctx: &RelayContext, entry: &EventLogEntry) -> Result<()> {
        let token = CancellationToken::new();
        let publish = ctx.bus.publish(&entry.event, &token);
        tokio::pin!(publish);

        tokio::select! {
            result = &mut publish => result?,
            _ = tokio::time::sleep(self.publish_timeout) => {
                // Let the bus observe the cancellation and abandon the send.
                token.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut publish).await.is_err() {
                    tracing::warn!(
                        event_id = %entry.event_id,
                        bus = ctx.bus.name(),
                        "Bus ignored publish cancellation"
                    );
                }
                return Err(OutboxError::Timeout(format!(
                    "publish to {} exceeded {}ms",
                    ctx.bus.name(),
                    self.publish_timeout.as_millis()
                )));
            }
        }

        with_timeout(
            "mark published",
            self.ack_timeout,
            ctx.store.mark_published(entry.event_id, self.ack_timeout),
        )
        .await?;

        tracing::debug!(
            event_id = %entry.event_id,
            type_name = %entry.type_name,
            "Event relayed"
        );

        Ok(())
    }

    /// Record a failed attempt; returns `false` if the write itself failed
    async fn record_failure(&self, ctx: &RelayContext, entry: &EventLogEntry) -> bool {
        let result = with_timeout(
            "mark failed",
            self.failure_write_timeout,
            ctx.store.mark_failed(entry.event_id, self.failure_write_timeout),
        )
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    event_id = %entry.event_id,
                    type_name = %entry.type_name,
                    transaction_id = %entry.transaction_id,
                    error = %e,
                    "Failed to record publish failure"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryBus;
    use crate::store::memory::MemoryEventLogStore;
    use crate::store::EventLogStore;
    use crate::types::{EventStatus, IntegrationEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn entry(event_type: &str) -> EventLogEntry {
        EventLogEntry::new(
            IntegrationEvent::new(event_type, serde_json::json!({"v": 1})),
            "tx-pipe",
        )
    }

    fn pipeline() -> PublishPipeline {
        PublishPipeline::new(&RelayConfig::default())
    }

    fn ctx(store: Arc<dyn EventLogStore>, bus: Arc<MemoryBus>) -> RelayContext {
        RelayContext::new(store, bus)
    }

    #[tokio::test]
    async fn test_success_marks_published() {
        let e = entry("orders.OrderPlaced");
        let store = Arc::new(MemoryEventLogStore::with_entries(vec![e.clone()]));
        let bus = Arc::new(MemoryBus::new());

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), vec![e.clone()], &CancellationToken::new())
            .await;

        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 0);
        let stored = store.get(e.event_id).await.unwrap();
        assert_eq!(stored.status, EventStatus::Published);
        assert_eq!(stored.attempt_count, 0);
        assert_eq!(bus.published().await, vec![e.event]);
    }

    #[tokio::test]
    async fn test_failure_marks_failed_once() {
        let e = entry("orders.OrderPlaced");
        let store = Arc::new(MemoryEventLogStore::with_entries(vec![e.clone()]));
        let bus = Arc::new(MemoryBus::new());
        bus.fail_event(e.event_id).await;

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), vec![e.clone()], &CancellationToken::new())
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.exhausted, 0);
        let stored = store.get(e.event_id).await.unwrap();
        assert_eq!(stored.status, EventStatus::PublishFailed);
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("a.E{}", i))).collect();
        let store = Arc::new(MemoryEventLogStore::with_entries(entries.clone()));
        let bus = Arc::new(MemoryBus::new());
        bus.fail_event(entries[2].event_id).await;

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), entries.clone(), &CancellationToken::new())
            .await;

        assert_eq!(report.published, 4);
        assert_eq!(report.failed, 1);
        for (i, e) in entries.iter().enumerate() {
            let stored = store.get(e.event_id).await.unwrap();
            if i == 2 {
                assert_eq!(stored.status, EventStatus::PublishFailed);
                assert_eq!(stored.attempt_count, 1);
            } else {
                assert_eq!(stored.status, EventStatus::Published);
                assert_eq!(stored.attempt_count, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_last_attempt_counts_as_exhausted() {
        let mut e = entry("orders.OrderPlaced");
        e.status = EventStatus::PublishFailed;
        e.attempt_count = 4;
        let store = Arc::new(MemoryEventLogStore::with_entries(vec![e.clone()]));
        let bus = Arc::new(MemoryBus::new());
        bus.fail_event(e.event_id).await;

        let report = pipeline()
            .run(&ctx(store.clone(), bus), vec![e.clone()], &CancellationToken::new())
            .await;

        assert_eq!(report.exhausted, 1);
        let stored = store.get(e.event_id).await.unwrap();
        assert_eq!(stored.attempt_count, 5);
        assert!(!stored.is_eligible(5));
    }

    #[tokio::test]
    async fn test_shutdown_defers_remaining() {
        let entries: Vec<_> = (0..3).map(|i| entry(&format!("a.E{}", i))).collect();
        let store = Arc::new(MemoryEventLogStore::with_entries(entries.clone()));
        let bus = Arc::new(MemoryBus::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), entries.clone(), &shutdown)
            .await;

        assert_eq!(report.deferred, 3);
        assert_eq!(bus.publish_count().await, 0);
        for e in &entries {
            assert_eq!(store.get(e.event_id).await.unwrap().status, EventStatus::Pending);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_is_a_failure() {
        let e = entry("orders.OrderPlaced");
        let store = Arc::new(MemoryEventLogStore::with_entries(vec![e.clone()]));
        let bus = Arc::new(MemoryBus::new().with_latency(Duration::from_secs(3600)));

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), vec![e.clone()], &CancellationToken::new())
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(bus.publish_count().await, 0);
        let stored = store.get(e.event_id).await.unwrap();
        assert_eq!(stored.status, EventStatus::PublishFailed);
        assert_eq!(stored.attempt_count, 1);
    }

    /// Bus that never completes on its own, only when its token is cancelled.
    #[derive(Default)]
    struct StallingBus {
        saw_cancel: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl crate::provider::MessageBus for StallingBus {
        async fn publish(&self, event: &IntegrationEvent, cancel: &CancellationToken) -> Result<()> {
            cancel.cancelled().await;
            self.saw_cancel.store(true, Ordering::SeqCst);
            Err(OutboxError::Cancelled(event.id.to_string()))
        }

        fn name(&self) -> &str {
            "stalling"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_cancels_bus_token() {
        let e = entry("orders.OrderPlaced");
        let store = Arc::new(MemoryEventLogStore::with_entries(vec![e.clone()]));
        let bus = Arc::new(StallingBus::default());

        let started = tokio::time::Instant::now();
        let report = pipeline()
            .run(&RelayContext::new(store.clone(), bus.clone()), vec![e.clone()], &CancellationToken::new())
            .await;

        assert!(bus.saw_cancel.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert_eq!(report.failed, 1);
        let stored = store.get(e.event_id).await.unwrap();
        assert_eq!(stored.status, EventStatus::PublishFailed);
        assert_eq!(stored.attempt_count, 1);
    }

    /// Store whose writes can be made to fail or hang.
    struct FaultyStore {
        inner: MemoryEventLogStore,
        fail_mark_published: bool,
        hang_mark_failed: bool,
        mark_failed_calls: AtomicUsize,
    }

    impl FaultyStore {
        fn new(entries: Vec<EventLogEntry>) -> Self {
            Self {
                inner: MemoryEventLogStore::with_entries(entries),
                fail_mark_published: false,
                hang_mark_failed: false,
                mark_failed_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EventLogStore for FaultyStore {
        async fn list_pending(&self) -> Result<Vec<EventLogEntry>> {
            self.inner.list_pending().await
        }

        async fn list_failed_below_retry_limit(&self, limit: u32) -> Result<Vec<EventLogEntry>> {
            self.inner.list_failed_below_retry_limit(limit).await
        }

        async fn mark_published(&self, id: Uuid, timeout: Duration) -> Result<()> {
            if self.fail_mark_published {
                return Err(OutboxError::Store("write conflict".to_string()));
            }
            self.inner.mark_published(id, timeout).await
        }

        async fn mark_failed(&self, id: Uuid, timeout: Duration) -> Result<()> {
            self.mark_failed_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_mark_failed {
                std::future::pending::<()>().await;
            }
            self.inner.mark_failed(id, timeout).await
        }

        fn name(&self) -> &str {
            "faulty"
        }
    }

    #[tokio::test]
    async fn test_ack_failure_after_publish_is_retryable() {
        let e = entry("orders.OrderPlaced");
        let mut faulty = FaultyStore::new(vec![e.clone()]);
        faulty.fail_mark_published = true;
        let store = Arc::new(faulty);
        let bus = Arc::new(MemoryBus::new());

        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), vec![e.clone()], &CancellationToken::new())
            .await;

        // Published on the bus, but the store says it failed: it will go out again.
        assert_eq!(bus.publish_count().await, 1);
        assert_eq!(report.failed, 1);
        let stored = store.inner.get(e.event_id).await.unwrap();
        assert_eq!(stored.status, EventStatus::PublishFailed);
        assert_eq!(stored.attempt_count, 1);
        assert!(stored.is_eligible(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_failure_write_is_bounded() {
        let a = entry("a.A");
        let b = entry("a.B");
        let mut faulty = FaultyStore::new(vec![a.clone(), b.clone()]);
        faulty.hang_mark_failed = true;
        let store = Arc::new(faulty);
        let bus = Arc::new(MemoryBus::new());
        bus.fail_event(a.event_id).await;

        let started = tokio::time::Instant::now();
        let report = pipeline()
            .run(&ctx(store.clone(), bus.clone()), vec![a.clone(), b.clone()], &CancellationToken::new())
            .await;

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(store.mark_failed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.unrecorded, 1);
        assert_eq!(report.published, 1);
        assert_eq!(
            store.inner.get(b.event_id).await.unwrap().status,
            EventStatus::Published
        );
    }
}
