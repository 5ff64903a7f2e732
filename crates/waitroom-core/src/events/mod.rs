//! Domain events emitted by admission operations.
//!
//! Events are handed to every registered [`AuditSink`](crate::traits::AuditSink):
//! the structured log, the audit table, and in-process subscribers.

pub mod admission;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use admission::AdmissionEvent;

/// Wrapper for all domain events with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub payload: AdmissionEvent,
}

impl DomainEvent {
    /// Create a new domain event stamped at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>, payload: AdmissionEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            payload,
        }
    }
}
