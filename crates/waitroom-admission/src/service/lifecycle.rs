//! Token status, validation, and the transitions out of `WAITING`/`ACTIVE`.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use waitroom_core::error::AppError;
use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};
use waitroom_entity::{AdmissionToken, HeartbeatKey, TokenState, TokenStatus};

use super::AdmissionService;

impl AdmissionService {
    /// Current state of a token.
    ///
    /// A live token found past its expiry is expired on the spot, releasing
    /// its slot and promoting the next waiter. A waiting token's position is
    /// re-derived, falling back to the stored value if the store is slow.
    pub async fn get_token_status(&self, token_value: &str) -> AppResult<TokenState> {
        let token = self
            .bounded(self.store.find_by_value(token_value))
            .await?
            .ok_or_else(|| AppError::not_found("Token not found"))?;
        let now = self.now();

        if token.is_live() && token.is_expired_at(now) {
            self.expire_observed(&token, now).await?;
            let mut state = TokenState::from(&token);
            state.status = TokenStatus::Expired;
            state.position = 0;
            state.eta_seconds = 0;
            return Ok(state);
        }

        let mut state = TokenState::from(&token);
        if token.status == TokenStatus::Waiting {
            state.position = self.display_position(&token).await;
            state.eta_seconds = self.eta_for(state.position);
        }
        Ok(state)
    }

    /// Whether the token currently permits the protected operation for
    /// `owner` on `resource`.
    ///
    /// Callers must re-validate immediately before committing: the answer
    /// can change as soon as it is returned. A stale token observed here is
    /// expired lazily.
    pub async fn validate_for_operation(
        &self,
        token_value: &str,
        owner: OwnerId,
        resource: ResourceId,
    ) -> AppResult<bool> {
        let Some(token) = self.bounded(self.store.find_by_value(token_value)).await? else {
            return Ok(false);
        };
        if token.owner_id != owner || token.resource_id != resource {
            return Ok(false);
        }

        let now = self.now();
        if token.is_active_for_operation_at(now) {
            return Ok(true);
        }

        if token.is_live() && token.is_expired_at(now) {
            if let Err(e) = self.expire_observed(&token, now).await {
                warn!(token_id = %token.id, error = %e, "Lazy expiry failed");
            }
        }
        Ok(false)
    }

    /// Record that the protected operation completed. Releases the slot and
    /// promotes the next waiter.
    ///
    /// Fails with `InvalidState` unless the token is active for the operation.
    pub async fn mark_used(&self, token_value: &str) -> AppResult<()> {
        let found = self
            .bounded(self.store.find_by_value(token_value))
            .await?
            .ok_or_else(|| AppError::not_found("Token not found"))?;
        let resource = found.resource_id;

        let _guard = self.locks.acquire(resource).await;
        let now = self.now();
        let token = self.reload(&found).await?;

        if !token.is_active_for_operation_at(now) {
            let lapsed = token.is_live() && token.is_expired_at(now);
            if lapsed && self.expire_locked(&token, "expired before use", now).await? {
                self.promote_locked(resource, now).await?;
            }
            let shown = if lapsed {
                TokenStatus::Expired
            } else {
                token.status
            };
            return Err(AppError::invalid_state(format!(
                "Token cannot be used from status {shown}"
            )));
        }

        let used = self
            .bounded(
                self.store
                    .transition(token.id, TokenStatus::Active, TokenStatus::Used, now),
            )
            .await?;
        if !used {
            return Err(AppError::invalid_state("Token is no longer active"));
        }

        self.release_slot(resource).await;
        info!(token_id = %token.id, resource_id = %resource, owner_id = %token.owner_id, "Token used");
        self.audit
            .emit(
                now,
                AdmissionEvent::Used {
                    token_id: token.id,
                    owner_id: token.owner_id,
                    resource_id: resource,
                },
            )
            .await;

        self.promote_locked(resource, now).await?;
        Ok(())
    }

    /// Withdraw a `WAITING` or `ACTIVE` token on behalf of its owner.
    ///
    /// An active token gives its slot back; a waiting one leaves the line
    /// and the line is repositioned. Promotion runs either way.
    pub async fn cancel_token(&self, token_value: &str, owner: OwnerId) -> AppResult<()> {
        let found = self.owned_token(token_value, owner, None).await?;
        let resource = found.resource_id;

        let _guard = self.locks.acquire(resource).await;
        let now = self.now();
        let token = self.reload(&found).await?;

        let prior = token.status;
        if !prior.is_live() {
            return Err(AppError::invalid_state(format!(
                "Token cannot be cancelled from status {prior}"
            )));
        }

        let cancelled = self
            .bounded(
                self.store
                    .transition(token.id, prior, TokenStatus::Cancelled, now),
            )
            .await?;
        if !cancelled {
            return Err(AppError::invalid_state("Token changed state during cancel"));
        }

        if prior == TokenStatus::Active {
            self.release_slot(resource).await;
            if let Some(sub) = token.sub_resource_id {
                let key = HeartbeatKey::new(token.owner_id, resource, sub);
                if let Err(e) = self.bounded(self.tracker.remove(&key)).await {
                    warn!(heartbeat = %key, error = %e, "Failed to drop heartbeat of cancelled token");
                }
            }
        }

        info!(token_id = %token.id, resource_id = %resource, owner_id = %owner, was = %prior, "Token cancelled");
        self.audit
            .emit(
                now,
                AdmissionEvent::Cancelled {
                    token_id: token.id,
                    owner_id: owner,
                    resource_id: resource,
                },
            )
            .await;

        self.promote_locked(resource, now).await?;
        if prior == TokenStatus::Waiting && !self.config.eager_reposition {
            self.reposition_quietly(resource).await;
        }
        Ok(())
    }

    /// Refresh the liveness record of a session. Never fails.
    pub async fn heartbeat(&self, owner: OwnerId, resource: ResourceId, sub: SubResourceId) {
        let key = HeartbeatKey::new(owner, resource, sub);
        self.beat_quietly(&key, self.now()).await;
    }

    /// End a session: drop its heartbeat and, if the heartbeat existed and
    /// the owner holds an active token, expire that token and release its
    /// slot. Promotion runs afterwards.
    ///
    /// Safe to call without authentication and any number of times; never fails.
    pub async fn release_session(&self, owner: OwnerId, resource: ResourceId, sub: SubResourceId) {
        if let Err(e) = self.try_release_session(owner, resource, sub).await {
            warn!(
                owner_id = %owner,
                resource_id = %resource,
                sub_resource_id = %sub,
                error = %e,
                "Session release failed"
            );
        }
    }

    async fn try_release_session(
        &self,
        owner: OwnerId,
        resource: ResourceId,
        sub: SubResourceId,
    ) -> AppResult<()> {
        let key = HeartbeatKey::new(owner, resource, sub);
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();

        let existed = self.bounded(self.tracker.remove(&key)).await?;
        if existed {
            if let Some(token) = self.bounded(self.store.find_live(owner, resource)).await? {
                if token.status == TokenStatus::Active {
                    self.expire_locked(&token, "session released", now).await?;
                }
            }
            info!(heartbeat = %key, "Session released");
            self.audit
                .emit(
                    now,
                    AdmissionEvent::SessionReleased {
                        owner_id: owner,
                        resource_id: resource,
                        sub_resource_id: sub,
                    },
                )
                .await;
        } else {
            debug!(heartbeat = %key, "Session already released");
        }

        self.promote_locked(resource, now).await?;
        Ok(())
    }

    /// Expire a token the caller found past its expiry, then promote.
    ///
    /// Returns how many tokens this call expired: zero when the token was
    /// already settled, otherwise one plus any stale waiters the follow-up
    /// promotion skipped.
    pub async fn expire_token(&self, token: &AdmissionToken, reason: &str) -> AppResult<u32> {
        let _guard = self.locks.acquire(token.resource_id).await;
        let now = self.now();
        if !self.expire_locked(token, reason, now).await? {
            return Ok(0);
        }
        let promotion = self.promote_locked(token.resource_id, now).await?;
        Ok(1 + promotion.expired)
    }

    async fn expire_observed(&self, token: &AdmissionToken, now: DateTime<Utc>) -> AppResult<()> {
        let _guard = self.locks.acquire(token.resource_id).await;
        let current = self.reload(token).await?;
        if current.is_live()
            && current.is_expired_at(now)
            && self.expire_locked(&current, "expired on read", now).await?
        {
            self.promote_locked(current.resource_id, now).await?;
        }
        Ok(())
    }

    /// Re-read a token inside the resource lock.
    async fn reload(&self, token: &AdmissionToken) -> AppResult<AdmissionToken> {
        self.bounded(self.store.find_by_value(&token.token_value))
            .await?
            .ok_or_else(|| AppError::not_found("Token not found"))
    }
}
