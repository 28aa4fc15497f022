//! Event selection — which log entries a cycle should (re-)publish

use crate::error::Result;
use crate::store::EventLogStore;
use crate::types::{EventLogEntry, EventStatus};
use std::collections::HashSet;

/// Computes the entries eligible for publication in one cycle
///
/// First-time deliveries go before retries: every `Pending` entry is
/// returned ahead of every retryable `PublishFailed` entry.
#[derive(Debug, Clone, Copy)]
pub struct EventSelector {
    retry_limit: u32,
}

impl EventSelector {
    /// Create a selector that skips failed entries at or above `retry_limit`
    pub fn new(retry_limit: u32) -> Self {
        Self { retry_limit }
    }

    /// Attempts allowed before a failed entry is no longer selected
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Read the eligible entries from `store`
    ///
    /// Read-only. An empty result means there is nothing to do this cycle.
    /// Store errors are returned as-is and fail the whole cycle.
    pub async fn select(&self, store: &dyn EventLogStore) -> Result<Vec<EventLogEntry>> {
        let pending = store.list_pending().await?;
        let failed = store.list_failed_below_retry_limit(self.retry_limit).await?;

        let mut seen = HashSet::with_capacity(pending.len() + failed.len());
        let mut selected = Vec::with_capacity(pending.len() + failed.len());

        // Re-check eligibility: a backend's query is not trusted to enforce it.
        let pending = pending
            .into_iter()
            .filter(|e| e.status == EventStatus::Pending);
        let failed = failed.into_iter().filter(|e| {
            e.status == EventStatus::PublishFailed && e.attempt_count < self.retry_limit
        });

        for entry in pending.chain(failed) {
            if seen.insert(entry.event_id) {
                selected.push(entry);
            }
        }

        tracing::debug!(
            store = store.name(),
            selected = selected.len(),
            retry_limit = self.retry_limit,
            "Selected outbox entries"
        );

        Ok(selected)
    }
}
