//! The admission orchestrator.
//!
//! Every check-then-act section runs under the lock of its resource only:
//! admission, activation, promotion, release and expiry. Within a section
//! the durable store decides; the slot counter is consulted for speed and
//! corrected whenever it would deny entry or is missing.

mod activate;
mod admin;
mod lifecycle;
mod promotion;
mod request;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{error, info, warn};

use waitroom_core::config::AdmissionConfig;
use waitroom_core::error::AppError;
use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::traits::IdentityDirectory;
use waitroom_core::types::{Clock, OwnerId, ResourceId, SubResourceId};
use waitroom_database::TokenStore;
use waitroom_entity::{AdmissionToken, HeartbeatKey, TokenStatus};

use crate::audit::AuditTrail;
use crate::heartbeat::HeartbeatTracker;
use crate::lock::ResourceLocks;
use crate::reconciler::CounterReconciler;
use crate::slot::{AcquireResult, ActiveSlotCounter};

pub use admin::ClearedSessions;
pub use promotion::Promotion;

/// Admission gate for contended resources.
#[derive(Debug)]
pub struct AdmissionService {
    config: AdmissionConfig,
    store: Arc<dyn TokenStore>,
    counter: Arc<dyn ActiveSlotCounter>,
    tracker: HeartbeatTracker,
    identity: Arc<dyn IdentityDirectory>,
    locks: ResourceLocks,
    reconciler: CounterReconciler,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
}

impl AdmissionService {
    /// Creates a new admission service.
    pub fn new(
        config: AdmissionConfig,
        store: Arc<dyn TokenStore>,
        counter: Arc<dyn ActiveSlotCounter>,
        tracker: HeartbeatTracker,
        identity: Arc<dyn IdentityDirectory>,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
    ) -> Self {
        let reconciler =
            CounterReconciler::new(Arc::clone(&store), Arc::clone(&counter), audit.clone());
        Self {
            config,
            store,
            counter,
            tracker,
            identity,
            locks: ResourceLocks::new(),
            reconciler,
            audit,
            clock,
        }
    }

    /// Admission configuration.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// The durable token store.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The fast slot counter.
    pub fn counter(&self) -> &Arc<dyn ActiveSlotCounter> {
        &self.counter
    }

    /// The heartbeat tracker.
    pub fn tracker(&self) -> &HeartbeatTracker {
        &self.tracker
    }

    /// The per-resource lock table.
    pub fn locks(&self) -> &ResourceLocks {
        &self.locks
    }

    /// Current time according to the service clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Shared helpers ─────────────────────────────────────

    /// Run a store call under the configured timeout.
    async fn bounded<T>(&self, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.config.store_timeout(), call).await?
    }

    fn cap(&self) -> u32 {
        self.config.max_active_per_resource
    }

    fn active_window_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + seconds(self.config.active_window_seconds)
    }

    fn overall_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + seconds(self.config.token_ttl_seconds)
    }

    fn eta_for(&self, position: u32) -> u64 {
        self.config.estimate_wait_seconds(position)
    }

    /// Find a token and check it belongs to `owner` on `resource`.
    ///
    /// A mismatch reads exactly like a missing token.
    async fn owned_token(
        &self,
        token_value: &str,
        owner: OwnerId,
        resource: Option<ResourceId>,
    ) -> AppResult<AdmissionToken> {
        let token = self
            .bounded(self.store.find_by_value(token_value))
            .await?
            .filter(|t| t.owner_id == owner && resource.is_none_or(|r| t.resource_id == r));
        token.ok_or_else(|| AppError::not_found("Token not found"))
    }

    /// Number of active holders, reseeding the counter from the durable
    /// store when the entry is missing or reports the resource full.
    async fn effective_active_count(
        &self,
        resource: ResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<u32> {
        match self.bounded(self.counter.current(resource)).await? {
            Some(count) if count < self.cap() => Ok(count),
            cached => {
                self.bounded(self.reconciler.reconcile(resource, cached, now))
                    .await
            }
        }
    }

    /// Atomically take a slot. Returns the new count, or `None` when full.
    async fn acquire_slot(
        &self,
        resource: ResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<u32>> {
        for _ in 0..2 {
            match self
                .bounded(self.counter.try_acquire(resource, self.cap()))
                .await?
            {
                AcquireResult::Granted(count) => return Ok(Some(count)),
                AcquireResult::Full(_) => return Ok(None),
                AcquireResult::Untracked => {
                    self.bounded(self.reconciler.reconcile(resource, None, now))
                        .await?;
                }
            }
        }
        Ok(None)
    }

    /// Give a slot back. Failures leave the counter high, which the next
    /// denying decision corrects.
    async fn release_slot(&self, resource: ResourceId) {
        if let Err(e) = self.bounded(self.counter.release(resource)).await {
            error!(resource_id = %resource, error = %e, "Failed to release slot");
        }
    }

    /// Refresh a heartbeat, logging instead of failing.
    async fn beat_quietly(&self, key: &HeartbeatKey, now: DateTime<Utc>) {
        if let Err(e) = self.bounded(self.tracker.beat(key, now)).await {
            warn!(heartbeat = %key, error = %e, "Failed to record heartbeat");
        }
    }

    /// Start the heartbeat of a freshly activated token when it names a sub-resource.
    async fn start_heartbeat(&self, token: &AdmissionToken, sub: Option<SubResourceId>, now: DateTime<Utc>) {
        if let Some(sub) = sub.or(token.sub_resource_id) {
            let key = HeartbeatKey::new(token.owner_id, token.resource_id, sub);
            self.beat_quietly(&key, now).await;
        }
    }

    /// Current FIFO position of a waiting token, falling back to the stored
    /// value when the store cannot answer in time. Persists a changed value.
    async fn display_position(&self, token: &AdmissionToken) -> u32 {
        let stale = token.position().max(1);
        match self
            .bounded(self.store.count_waiting_before(token.resource_id, token.seq))
            .await
        {
            Ok(ahead) => {
                let position = ahead + 1;
                if position != token.position() {
                    let eta = i64::try_from(self.eta_for(position)).unwrap_or(i64::MAX);
                    let update = [(token.id, position_i32(position), eta)];
                    if let Err(e) = self.bounded(self.store.update_positions(&update)).await {
                        warn!(token_id = %token.id, error = %e, "Failed to persist queue position");
                    }
                }
                position
            }
            Err(e) => {
                warn!(token_id = %token.id, error = %e, "Using stale queue position");
                stale
            }
        }
    }

    /// Move a live token to `EXPIRED`. Releases its slot if it was active.
    /// Does not promote; the caller holds the resource lock and decides.
    async fn expire_locked(
        &self,
        token: &AdmissionToken,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !token.is_live() {
            return Ok(false);
        }

        let expired = self
            .bounded(
                self.store
                    .transition(token.id, token.status, TokenStatus::Expired, now),
            )
            .await?;
        if !expired {
            return Ok(false);
        }

        if token.status == TokenStatus::Active {
            self.release_slot(token.resource_id).await;
        }
        info!(
            token_id = %token.id,
            resource_id = %token.resource_id,
            owner_id = %token.owner_id,
            was = %token.status,
            reason,
            "Token expired"
        );
        self.audit
            .emit(
                now,
                AdmissionEvent::Expired {
                    token_id: token.id,
                    owner_id: token.owner_id,
                    resource_id: token.resource_id,
                    reason: reason.to_string(),
                },
            )
            .await;
        Ok(true)
    }
}

/// Configured durations are clamped to ten years.
fn seconds(secs: u64) -> ChronoDuration {
    const MAX_SECS: i64 = 10 * 365 * 24 * 3600;
    ChronoDuration::seconds(i64::try_from(secs).unwrap_or(MAX_SECS).min(MAX_SECS))
}

fn position_i32(position: u32) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}
