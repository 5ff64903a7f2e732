//! Admission requests.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};
use waitroom_entity::{AdmissionTicket, AdmissionToken, HeartbeatKey, NewToken, TokenStatus};

use super::{AdmissionService, position_i32};
use crate::token::generate_token_value;

impl AdmissionService {
    /// Ask to enter the protected operation for `resource`.
    ///
    /// Returns the caller's existing live token when there is one. Otherwise
    /// mints an `ACTIVE` token if a slot is free and nobody is waiting, or a
    /// `WAITING` token at the back of the line.
    ///
    /// Unknown owners or resources fail with `NotFound`. Any other failure
    /// yields a degraded "queued" ticket; an error never grants entry.
    pub async fn request_admission(
        &self,
        resource: ResourceId,
        sub: SubResourceId,
        owner: OwnerId,
    ) -> AppResult<AdmissionTicket> {
        match self.admit(resource, sub, owner).await {
            Ok(ticket) => Ok(ticket),
            Err(e) if matches!(e.kind, ErrorKind::NotFound | ErrorKind::Validation) => Err(e),
            Err(e) => {
                warn!(
                    resource_id = %resource,
                    owner_id = %owner,
                    error = %e,
                    "Admission degraded to queueing"
                );
                Ok(AdmissionTicket::degraded(self.cap()))
            }
        }
    }

    async fn ensure_identity(&self, owner: OwnerId, resource: ResourceId) -> AppResult<()> {
        if !self.bounded(self.identity.owner_exists(owner)).await? {
            return Err(AppError::not_found(format!("Owner {owner} not found")));
        }
        if !self.bounded(self.identity.resource_exists(resource)).await? {
            return Err(AppError::not_found(format!("Resource {resource} not found")));
        }
        Ok(())
    }

    async fn admit(
        &self,
        resource: ResourceId,
        sub: SubResourceId,
        owner: OwnerId,
    ) -> AppResult<AdmissionTicket> {
        self.ensure_identity(owner, resource).await?;

        let _guard = self.locks.acquire(resource).await;
        let now = self.now();

        if let Some(existing) = self.bounded(self.store.find_live(owner, resource)).await? {
            if !existing.is_expired_at(now) {
                return self.existing_ticket(&existing, sub, now).await;
            }
            if self.expire_locked(&existing, "expired before re-request", now).await?
                && existing.status == TokenStatus::Active
            {
                self.promote_locked(resource, now).await?;
            }
        }

        if self.line_is_clear(resource, now).await? {
            if let Some(active) = self.acquire_slot(resource, now).await? {
                return self.mint_active(resource, sub, owner, active, now).await;
            }
        }

        self.mint_waiting(resource, sub, owner, now).await
    }

    /// Whether a newcomer may go straight in: a slot is free and nobody is
    /// waiting. Waiters are promoted first so a newcomer never overtakes them.
    async fn line_is_clear(&self, resource: ResourceId, now: DateTime<Utc>) -> AppResult<bool> {
        if self.effective_active_count(resource, now).await? >= self.cap() {
            return Ok(false);
        }

        let waiting = self
            .bounded(self.store.count_with_status(resource, TokenStatus::Waiting))
            .await?;
        if waiting == 0 {
            return Ok(true);
        }

        self.promote_locked(resource, now).await?;
        let still_waiting = self
            .bounded(self.store.count_with_status(resource, TokenStatus::Waiting))
            .await?;
        Ok(still_waiting == 0)
    }

    async fn existing_ticket(
        &self,
        token: &AdmissionToken,
        sub: SubResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<AdmissionTicket> {
        match token.status {
            TokenStatus::Active => {
                if let Some(previous) = token.sub_resource_id.filter(|prev| *prev != sub) {
                    let stale = HeartbeatKey::new(token.owner_id, token.resource_id, previous);
                    if let Err(e) = self.bounded(self.tracker.remove(&stale)).await {
                        warn!(heartbeat = %stale, error = %e, "Failed to drop superseded heartbeat");
                    }
                }
                self.beat_quietly(&HeartbeatKey::new(token.owner_id, token.resource_id, sub), now)
                    .await;
                let active = self
                    .bounded(self.counter.current(token.resource_id))
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(1);
                Ok(AdmissionTicket::proceed(token, active, self.cap()))
            }
            _ => {
                let position = self.display_position(token).await;
                let active = self.effective_active_count(token.resource_id, now).await?;
                Ok(AdmissionTicket::queued(
                    token,
                    position,
                    self.eta_for(position),
                    active,
                    self.cap(),
                ))
            }
        }
    }

    async fn mint_active(
        &self,
        resource: ResourceId,
        sub: SubResourceId,
        owner: OwnerId,
        active: u32,
        now: DateTime<Utc>,
    ) -> AppResult<AdmissionTicket> {
        let new_token = NewToken {
            token_value: generate_token_value(),
            owner_id: owner,
            resource_id: resource,
            sub_resource_id: Some(sub),
            status: TokenStatus::Active,
            queue_position: 0,
            estimated_wait_seconds: 0,
            issued_at: now,
            expires_at: self.overall_end(now),
            active_window_expires_at: Some(self.active_window_end(now)),
        };

        let token = match self.bounded(self.store.insert(new_token)).await {
            Ok(token) => token,
            Err(e) => {
                self.release_slot(resource).await;
                return Err(e);
            }
        };

        self.start_heartbeat(&token, Some(sub), now).await;
        info!(
            token_id = %token.id,
            resource_id = %resource,
            owner_id = %owner,
            active,
            "Admitted directly"
        );
        self.audit
            .emit(
                now,
                AdmissionEvent::Created {
                    token_id: token.id,
                    owner_id: owner,
                    resource_id: resource,
                    active: true,
                    position: 0,
                },
            )
            .await;

        Ok(AdmissionTicket::proceed(&token, active, self.cap()))
    }

    async fn mint_waiting(
        &self,
        resource: ResourceId,
        sub: SubResourceId,
        owner: OwnerId,
        now: DateTime<Utc>,
    ) -> AppResult<AdmissionTicket> {
        let ahead = self
            .bounded(self.store.count_with_status(resource, TokenStatus::Waiting))
            .await?;
        let provisional = ahead + 1;

        let new_token = NewToken {
            token_value: generate_token_value(),
            owner_id: owner,
            resource_id: resource,
            sub_resource_id: Some(sub),
            status: TokenStatus::Waiting,
            queue_position: position_i32(provisional),
            estimated_wait_seconds: i64::try_from(self.eta_for(provisional)).unwrap_or(i64::MAX),
            issued_at: now,
            expires_at: self.overall_end(now),
            active_window_expires_at: None,
        };
        let token = self.bounded(self.store.insert(new_token)).await?;

        let position = self.display_position(&token).await;
        let eta = self.eta_for(position);
        let active = self
            .bounded(self.counter.current(resource))
            .await
            .ok()
            .flatten()
            .unwrap_or(self.cap());

        info!(
            token_id = %token.id,
            resource_id = %resource,
            owner_id = %owner,
            position,
            eta_seconds = eta,
            "Queued"
        );
        self.audit
            .emit(
                now,
                AdmissionEvent::Created {
                    token_id: token.id,
                    owner_id: owner,
                    resource_id: resource,
                    active: false,
                    position,
                },
            )
            .await;

        Ok(AdmissionTicket::queued(&token, position, eta, active, self.cap()))
    }
}
