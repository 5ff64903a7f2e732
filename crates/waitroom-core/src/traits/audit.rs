//! Receivers of admission events.

use async_trait::async_trait;

use crate::events::DomainEvent;
use crate::result::AppResult;

/// A destination for admission events.
///
/// Sinks are best-effort: the caller logs and ignores failures.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug + 'static {
    /// Record one event.
    async fn record(&self, event: &DomainEvent) -> AppResult<()>;
}
