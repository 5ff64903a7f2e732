//! Operator-facing queries and corrective actions.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::{QueueStats, TokenState, TokenStatus};

use super::AdmissionService;

/// What an admin session reset removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedSessions {
    /// Heartbeat records deleted.
    pub heartbeats: u64,
    /// Slot counter entries deleted.
    pub counters: u64,
}

impl AdmissionService {
    /// Live tokens held by an owner, newest first.
    pub async fn owner_tokens(&self, owner: OwnerId) -> AppResult<Vec<TokenState>> {
        let tokens = self
            .bounded(self.store.find_live_by_owner(owner))
            .await?;
        Ok(tokens.iter().map(TokenState::from).collect())
    }

    /// Line statistics for one resource.
    pub async fn queue_stats(&self, resource: ResourceId) -> AppResult<QueueStats> {
        let counts = self.bounded(self.store.status_counts(resource)).await?;
        Ok(QueueStats::from_counts(
            resource,
            counts,
            self.config.wait_seconds_per_person,
        ))
    }

    /// Line statistics for every resource with someone waiting or active.
    pub async fn all_queue_stats(&self) -> AppResult<Vec<QueueStats>> {
        let mut all = Vec::new();
        for resource in self.bounded(self.store.resources_with_tokens()).await? {
            let stats = self.queue_stats(resource).await?;
            if stats.has_activity() {
                all.push(stats);
            }
        }
        Ok(all)
    }

    /// Reconcile the counter, promote into free slots and reposition the
    /// whole line. Returns the number of tokens promoted.
    pub async fn force_process(&self, resource: ResourceId) -> AppResult<u32> {
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();

        let cached = self.bounded(self.counter.current(resource)).await?;
        self.bounded(self.reconciler.reconcile(resource, cached, now))
            .await?;
        let promoted = self.promote_locked(resource, now).await?.activated;
        self.reposition_locked(resource).await?;

        info!(resource_id = %resource, promoted, "Queue processed on demand");
        Ok(promoted)
    }

    /// Make the slot counter agree with the durable store. Returns the
    /// durable active count.
    pub async fn reconcile_counter(&self, resource: ResourceId) -> AppResult<u32> {
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();
        let cached = self.bounded(self.counter.current(resource)).await?;
        self.bounded(self.reconciler.reconcile(resource, cached, now))
            .await
    }

    /// Drop a slot counter entry that has no live heartbeat behind it,
    /// reseeding it when the durable store still has active tokens.
    /// Returns `true` if an entry was dropped.
    pub async fn drop_orphan_counter(&self, resource: ResourceId) -> AppResult<bool> {
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();

        if !self
            .bounded(self.tracker.live_for_resource(resource, now))
            .await?
            .is_empty()
        {
            return Ok(false);
        }

        let removed = self.bounded(self.counter.remove(resource)).await?;
        let durable = self
            .bounded(self.store.count_with_status(resource, TokenStatus::Active))
            .await?;
        if durable > 0 {
            self.bounded(self.counter.resync(resource, durable)).await?;
        }

        if removed {
            info!(resource_id = %resource, durable, "Orphaned slot counter dropped");
        }
        Ok(removed)
    }

    /// Delete every heartbeat and slot counter entry.
    ///
    /// Counters are rebuilt from the durable store on next use.
    pub async fn clear_all_sessions(&self) -> AppResult<ClearedSessions> {
        let heartbeats = self.bounded(self.tracker.clear_all()).await?;

        let mut counters = 0;
        for resource in self.bounded(self.counter.tracked_resources()).await? {
            let _guard = self.locks.acquire(resource).await;
            match self.bounded(self.counter.remove(resource)).await {
                Ok(true) => counters += 1,
                Ok(false) => {}
                Err(e) => warn!(resource_id = %resource, error = %e, "Failed to drop slot counter"),
            }
        }

        warn!(heartbeats, counters, "All sessions cleared");
        Ok(ClearedSessions {
            heartbeats,
            counters,
        })
    }

    /// Delete `USED` tokens used before `cutoff`.
    pub async fn purge_used(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let purged = self.bounded(self.store.purge_used_before(cutoff)).await?;
        info!(purged, cutoff = %cutoff, "Purged used tokens");
        Ok(purged)
    }

    /// Delete `USED` tokens older than the configured retention.
    pub async fn purge_past_retention(&self) -> AppResult<u64> {
        let hours = i64::try_from(self.config.used_retention_hours).unwrap_or(i64::MAX / 3600);
        let cutoff = self.now() - ChronoDuration::hours(hours.min(24 * 365 * 10));
        self.purge_used(cutoff).await
    }
}
