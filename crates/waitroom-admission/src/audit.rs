//! Admission event sinks and fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use waitroom_core::events::{AdmissionEvent, DomainEvent};
use waitroom_core::result::AppResult;
use waitroom_core::traits::AuditSink;

/// Writes every event to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = &event.payload;
        info!(
            event = payload.name(),
            resource_id = %payload.resource_id(),
            owner_id = ?payload.owner_id(),
            token_id = ?payload.token_id(),
            at = %event.timestamp,
            "Admission event"
        );
        Ok(())
    }
}

/// Publishes events to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastAuditSink {
    /// Creates a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AuditSink for BroadcastAuditSink {
    async fn record(&self, event: &DomainEvent) -> AppResult<()> {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Fans events out to every registered sink.
///
/// Delivery is best-effort: a failing or slow sink is logged and skipped.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    sinks: Vec<Arc<dyn AuditSink>>,
    timeout: Duration,
}

impl AuditTrail {
    /// Creates a trail with no sinks.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            timeout,
        }
    }

    /// Register a sink.
    pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Deliver an event stamped at `at`.
    pub async fn emit(&self, at: DateTime<Utc>, payload: AdmissionEvent) {
        let event = DomainEvent::new(at, payload);
        for sink in &self.sinks {
            match tokio::time::timeout(self.timeout, sink.record(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = event.payload.name(), error = %e, "Audit sink failed"),
                Err(_) => warn!(event = event.payload.name(), "Audit sink timed out"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use waitroom_core::types::{OwnerId, ResourceId};

    #[tokio::test]
    async fn test_trail_delivers_to_subscribers() {
        let broadcast = BroadcastAuditSink::new(16);
        let mut rx = broadcast.subscribe();

        let mut trail = AuditTrail::new(Duration::from_secs(1));
        trail.add_sink(Arc::new(TracingAuditSink));
        trail.add_sink(Arc::new(broadcast));

        let token_id = Uuid::now_v7();
        trail
            .emit(
                Utc::now(),
                AdmissionEvent::Cancelled {
                    token_id,
                    owner_id: OwnerId::new(1),
                    resource_id: ResourceId::new(2),
                },
            )
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.payload.name(), "token.cancelled");
        assert_eq!(event.payload.token_id(), Some(token_id));
    }
}
