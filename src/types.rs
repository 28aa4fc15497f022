//! Core outbox types
//!
//! All types use camelCase JSON serialization for wire compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An integration event as written by the business transaction
///
/// This is the message the relay hands to the bus. `event_type` is the
/// type discriminator (e.g., `orders.OrderPlaced`); the payload itself is
/// opaque to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    /// Unique event identifier
    pub id: Uuid,

    /// Fully qualified event type
    pub event_type: String,

    /// When the event was raised
    pub creation_date: DateTime<Utc>,

    /// Event payload — arbitrary JSON data
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Create a new event with auto-generated id and timestamp
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            creation_date: Utc::now(),
            payload,
        }
    }

    /// Short, human-readable type name (last path segment of `event_type`)
    pub fn short_type_name(&self) -> &str {
        short_type_name(&self.event_type)
    }
}

/// Strip namespace qualifiers (`.`, `::`) from a type identifier
pub fn short_type_name(event_type: &str) -> &str {
    event_type
        .rsplit(|c: char| c == '.' || c == ':')
        .find(|s| !s.is_empty())
        .unwrap_or(event_type)
}

/// Delivery status of an event log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    /// Written by the business transaction, not yet attempted
    #[default]
    Pending,
    /// Delivered to the bus and acknowledged in the store (terminal)
    Published,
    /// Last delivery attempt failed
    PublishFailed,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Published => write!(f, "published"),
            Self::PublishFailed => write!(f, "publishFailed"),
        }
    }
}

/// One row of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    /// Same as `event.id`; immutable
    pub event_id: Uuid,

    /// The event to publish
    pub event: IntegrationEvent,

    /// Short event type, for diagnostics
    pub type_name: String,

    /// Originating business transaction (correlation only)
    pub transaction_id: String,

    /// Delivery status
    #[serde(default)]
    pub status: EventStatus,

    /// Number of failed publish attempts
    #[serde(default)]
    pub attempt_count: u32,

    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    /// Create a pending entry for `event`, written by `transaction_id`
    pub fn new(event: IntegrationEvent, transaction_id: impl Into<String>) -> Self {
        Self {
            event_id: event.id,
            type_name: event.short_type_name().to_string(),
            transaction_id: transaction_id.into(),
            status: EventStatus::Pending,
            attempt_count: 0,
            created_at: event.creation_date,
            event,
        }
    }

    /// Whether the relay should (re-)publish this entry
    pub fn is_eligible(&self, retry_limit: u32) -> bool {
        match self.status {
            EventStatus::Pending => true,
            EventStatus::PublishFailed => self.attempt_count < retry_limit,
            EventStatus::Published => false,
        }
    }

    /// Transition to `Published`
    pub fn record_published(&mut self) {
        self.status = EventStatus::Published;
    }

    /// Transition to `PublishFailed` and count the attempt
    ///
    /// Returns `false` without touching the entry when it is already
    /// `Published`: a late failure write must not resurrect a delivered event.
    pub fn record_failure(&mut self) -> bool {
        if self.status == EventStatus::Published {
            return false;
        }
        self.status = EventStatus::PublishFailed;
        self.attempt_count = self.attempt_count.saturating_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> EventLogEntry {
        EventLogEntry::new(
            IntegrationEvent::new("orders.OrderPlaced", serde_json::json!({"orderId": 42})),
            "tx-1",
        )
    }

    #[test]
    fn test_entry_creation() {
        let e = entry();
        assert_eq!(e.event_id, e.event.id);
        assert_eq!(e.type_name, "OrderPlaced");
        assert_eq!(e.transaction_id, "tx-1");
        assert_eq!(e.status, EventStatus::Pending);
        assert_eq!(e.attempt_count, 0);
        assert_eq!(e.created_at, e.event.creation_date);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("orders.OrderPlaced"), "OrderPlaced");
        assert_eq!(short_type_name("billing::InvoiceIssued"), "InvoiceIssued");
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(short_type_name("trailing."), "trailing");
    }

    #[test]
    fn test_eligibility() {
        let mut e = entry();
        assert!(e.is_eligible(5));

        e.status = EventStatus::PublishFailed;
        e.attempt_count = 4;
        assert!(e.is_eligible(5));

        e.attempt_count = 5;
        assert!(!e.is_eligible(5));

        e.status = EventStatus::Published;
        e.attempt_count = 0;
        assert!(!e.is_eligible(5));
    }

    #[test]
    fn test_record_failure_increments_by_one() {
        let mut e = entry();
        assert!(e.record_failure());
        assert_eq!(e.status, EventStatus::PublishFailed);
        assert_eq!(e.attempt_count, 1);

        assert!(e.record_failure());
        assert_eq!(e.attempt_count, 2);
    }

    #[test]
    fn test_published_is_terminal() {
        let mut e = entry();
        e.record_published();
        assert!(!e.record_failure());
        assert_eq!(e.status, EventStatus::Published);
        assert_eq!(e.attempt_count, 0);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&EventStatus::PublishFailed).unwrap();
        assert_eq!(json, "\"publishFailed\"");
        assert_eq!(EventStatus::PublishFailed.to_string(), "publishFailed");
    }

    #[test]
    fn test_entry_serialization_camel_case() {
        let e = entry();
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("transactionId").is_some());
        assert_eq!(json["attemptCount"], 0);
        assert_eq!(json["event"]["eventType"], "orders.OrderPlaced");

        let parsed: EventLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn test_entry_backward_compat_defaults() {
        let e = entry();
        let mut json = serde_json::to_value(&e).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("status");
        obj.remove("attemptCount");

        let parsed: EventLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.status, EventStatus::Pending);
        assert_eq!(parsed.attempt_count, 0);
    }
}
