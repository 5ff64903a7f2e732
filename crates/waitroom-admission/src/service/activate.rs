//! Activation of a waiting token by its holder.

use tracing::info;

use waitroom_core::error::AppError;
use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};
use waitroom_entity::{TokenState, TokenStatus};

use super::AdmissionService;

impl AdmissionService {
    /// Turn a waiting token into an active one, if it is first in line and
    /// a slot is free.
    ///
    /// The first-in-line check, the slot check, the counter increment and
    /// the durable activation all happen under the resource lock; a failed
    /// activation gives the slot back.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the token does not exist or belongs to someone else
    /// - `Gone` when the token is used, cancelled or expired
    /// - `Conflict` carrying the caller's position when it is not their turn
    ///   or no slot is free
    pub async fn activate_token(
        &self,
        token_value: &str,
        owner: OwnerId,
        resource: ResourceId,
        sub: SubResourceId,
    ) -> AppResult<TokenState> {
        let _guard = self.locks.acquire(resource).await;
        let now = self.now();
        let mut token = self.owned_token(token_value, owner, Some(resource)).await?;

        match token.status {
            TokenStatus::Used | TokenStatus::Cancelled | TokenStatus::Expired => {
                return Err(AppError::gone(format!("Token is {}", token.status)));
            }
            TokenStatus::Active => {
                if token.is_expired_at(now) {
                    if self.expire_locked(&token, "active window elapsed", now).await? {
                        self.promote_locked(resource, now).await?;
                    }
                    return Err(AppError::gone("Token has expired"));
                }
                return Ok(TokenState::from(&token));
            }
            TokenStatus::Waiting => {}
        }

        if token.is_expired_at(now) {
            if self.expire_locked(&token, "expired while waiting", now).await? {
                self.reposition_quietly(resource).await;
            }
            return Err(AppError::gone("Token has expired"));
        }

        let ahead = self
            .bounded(self.store.count_waiting_before(resource, token.seq))
            .await?;
        if ahead > 0 {
            return Err(AppError::not_your_turn(ahead + 1));
        }

        // The durable count is authoritative for activation.
        let cached = self.bounded(self.counter.current(resource)).await?;
        let active = self
            .bounded(self.reconciler.reconcile(resource, cached, now))
            .await?;
        if active >= self.cap() {
            return Err(AppError::no_free_slot(1));
        }

        let Some(count) = self.acquire_slot(resource, now).await? else {
            return Err(AppError::no_free_slot(1));
        };

        let window_end = self.active_window_end(now);
        match self
            .bounded(self.store.activate(token.id, now, window_end))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.release_slot(resource).await;
                return Err(AppError::invalid_state("Token is no longer waiting"));
            }
            Err(e) => {
                self.release_slot(resource).await;
                return Err(e);
            }
        }

        token.status = TokenStatus::Active;
        token.queue_position = 0;
        token.estimated_wait_seconds = 0;
        token.activated_at = Some(now);
        token.active_window_expires_at = Some(window_end);
        token.updated_at = now;

        self.start_heartbeat(&token, Some(sub), now).await;
        info!(
            token_id = %token.id,
            resource_id = %resource,
            owner_id = %owner,
            active = count,
            "Token activated"
        );
        self.audit
            .emit(
                now,
                AdmissionEvent::Activated {
                    token_id: token.id,
                    owner_id: owner,
                    resource_id: resource,
                },
            )
            .await;

        if self.config.eager_reposition {
            self.reposition_quietly(resource).await;
        }
        Ok(TokenState::from(&token))
    }
}
