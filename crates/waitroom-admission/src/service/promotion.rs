//! Promotion of waiters into free slots, and queue repositioning.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::types::ResourceId;
use waitroom_database::store::PositionUpdate;

use super::{AdmissionService, position_i32};

/// Outcome of one promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Promotion {
    /// Waiters moved into a slot.
    pub activated: u32,
    /// Waiters found past their expiry on the way and expired.
    pub expired: u32,
}

impl AdmissionService {
    /// Promote the head of the line into any free slots on `resource`.
    /// Returns the number of tokens activated.
    pub async fn promote_next(&self, resource: ResourceId) -> AppResult<u32> {
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();
        Ok(self.promote_locked(resource, now).await?.activated)
    }

    /// Grant up to `cap - active` of the earliest live waiters. The caller
    /// holds the resource lock.
    ///
    /// Stale waiters at the front are expired and skipped, and the line is
    /// read again until every free slot is filled or nobody is left. Each
    /// grant takes a slot first and activates second; a failed activation
    /// gives the slot back before anything else happens.
    pub(super) async fn promote_locked(
        &self,
        resource: ResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<Promotion> {
        let active = self.effective_active_count(resource, now).await?;
        let free = self.cap().saturating_sub(active);
        let mut outcome = Promotion::default();

        'fill: while outcome.activated < free {
            let head = self
                .bounded(
                    self.store
                        .waiting_in_order(resource, Some(free - outcome.activated)),
                )
                .await?;
            if head.is_empty() {
                break;
            }

            let mut skipped = false;
            for token in head {
                if token.is_expired_at(now) {
                    if self
                        .expire_locked(&token, "expired while waiting", now)
                        .await?
                    {
                        outcome.expired += 1;
                        skipped = true;
                    }
                    continue;
                }

                if self.acquire_slot(resource, now).await?.is_none() {
                    break 'fill;
                }

                let window_end = self.active_window_end(now);
                match self
                    .bounded(self.store.activate(token.id, now, window_end))
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(token_id = %token.id, "Token left the line before promotion");
                        self.release_slot(resource).await;
                        continue;
                    }
                    Err(e) => {
                        self.release_slot(resource).await;
                        return Err(e);
                    }
                }

                self.start_heartbeat(&token, None, now).await;
                info!(
                    token_id = %token.id,
                    resource_id = %resource,
                    owner_id = %token.owner_id,
                    "Promoted from queue"
                );
                self.audit
                    .emit(
                        now,
                        AdmissionEvent::Activated {
                            token_id: token.id,
                            owner_id: token.owner_id,
                            resource_id: resource,
                        },
                    )
                    .await;
                outcome.activated += 1;
            }

            if !skipped {
                break;
            }
        }

        if self.config.eager_reposition {
            self.reposition_quietly(resource).await;
        }
        Ok(outcome)
    }

    /// Rewrite the position and estimate of every waiter on `resource`.
    /// Returns the number of tokens whose position changed.
    pub(super) async fn reposition_locked(&self, resource: ResourceId) -> AppResult<usize> {
        let waiting = self
            .bounded(self.store.waiting_in_order(resource, None))
            .await?;

        let updates: Vec<PositionUpdate> = waiting
            .iter()
            .enumerate()
            .filter_map(|(index, token)| {
                let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
                (token.position() != position).then(|| {
                    let eta = i64::try_from(self.eta_for(position)).unwrap_or(i64::MAX);
                    (token.id, position_i32(position), eta)
                })
            })
            .collect();

        if !updates.is_empty() {
            self.bounded(self.store.update_positions(&updates)).await?;
            debug!(resource_id = %resource, changed = updates.len(), "Queue repositioned");
        }
        Ok(updates.len())
    }

    /// Repositioning only refreshes what callers are shown, so failures are logged.
    pub(super) async fn reposition_quietly(&self, resource: ResourceId) {
        if let Err(e) = self.reposition_locked(resource).await {
            warn!(resource_id = %resource, error = %e, "Failed to reposition queue");
        }
    }
}
