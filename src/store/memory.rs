//! In-memory event log store for development and testing

use super::EventLogStore;
use crate::error::{OutboxError, Result};
use crate::types::{EventLogEntry, EventStatus};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory event log
///
/// Keeps entries in insertion order, so `list_pending` returns them oldest
/// first. Lost on drop.
#[derive(Default)]
pub struct MemoryEventLogStore {
    entries: RwLock<Vec<EventLogEntry>>,
}

impl MemoryEventLogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entries`
    pub fn with_entries(entries: impl IntoIterator<Item = EventLogEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Append an entry (the transactional writer side)
    pub async fn append(&self, entry: EventLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.event_id == entry.event_id) {
            return Err(OutboxError::AlreadyExists(entry.event_id.to_string()));
        }
        entries.push(entry);
        Ok(())
    }

    /// Look up an entry by id
    pub async fn get(&self, event_id: Uuid) -> Option<EventLogEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.event_id == event_id).cloned()
    }

    /// Snapshot of all entries in insertion order
    pub async fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.read().await.clone()
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn update(&self, event_id: Uuid, apply: impl FnOnce(&mut EventLogEntry)) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| OutboxError::NotFound(event_id.to_string()))?;
        apply(entry);
        Ok(())
    }
}

#[async_trait]
impl EventLogStore for MemoryEventLogStore {
    async fn list_pending(&self) -> Result<Vec<EventLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.status == EventStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_failed_below_retry_limit(&self, retry_limit: u32) -> Result<Vec<EventLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.status == EventStatus::PublishFailed && e.attempt_count < retry_limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, event_id: Uuid, _timeout: Duration) -> Result<()> {
        self.update(event_id, |e| e.record_published()).await
    }

    async fn mark_failed(&self, event_id: Uuid, _timeout: Duration) -> Result<()> {
        self.update(event_id, |e| {
            e.record_failure();
        })
        .await
    }

    fn name(&self) -> &str {
        "memory"
    }
}
