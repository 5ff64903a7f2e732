//! Admission token entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};

use super::status::TokenStatus;

/// A caller-held credential: either a place in line or a grant to proceed.
///
/// `seq` is the issuance sequence; FIFO order among waiters is `seq` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AdmissionToken {
    /// Opaque system identifier.
    pub id: Uuid,
    /// Monotonic issuance sequence.
    pub seq: i64,
    /// Unguessable value presented by the caller.
    pub token_value: String,
    /// The requester.
    pub owner_id: OwnerId,
    /// The contended resource.
    pub resource_id: ResourceId,
    /// The sub-resource named at request time, used to key the heartbeat.
    pub sub_resource_id: Option<SubResourceId>,
    /// Current status.
    pub status: TokenStatus,
    /// Position in line while waiting, 0 otherwise.
    pub queue_position: i32,
    /// Estimated wait while waiting, 0 otherwise.
    pub estimated_wait_seconds: i64,

    // -- Timestamps --
    /// When the token was minted.
    pub issued_at: DateTime<Utc>,
    /// Absolute ceiling regardless of state.
    pub expires_at: DateTime<Utc>,
    /// When the token became active.
    pub activated_at: Option<DateTime<Utc>>,
    /// End of the active window. Set only on entering `ACTIVE`.
    pub active_window_expires_at: Option<DateTime<Utc>>,
    /// When the protected operation completed.
    pub used_at: Option<DateTime<Utc>>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl AdmissionToken {
    /// Whether the token has passed its overall ceiling or, while active,
    /// its active window.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.expires_at <= now {
            return true;
        }
        self.status == TokenStatus::Active
            && self
                .active_window_expires_at
                .is_some_and(|window| window <= now)
    }

    /// Whether the token currently permits the protected operation.
    pub fn is_active_for_operation_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Active
            && self.expires_at > now
            && self.active_window_expires_at.is_some_and(|window| window > now)
    }

    /// Whether the token is `WAITING` or `ACTIVE`.
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Queue position as an unsigned value.
    pub fn position(&self) -> u32 {
        u32::try_from(self.queue_position).unwrap_or(0)
    }
}

/// Data required to mint a token.
#[derive(Debug, Clone)]
pub struct NewToken {
    /// Unguessable value presented by the caller.
    pub token_value: String,
    /// The requester.
    pub owner_id: OwnerId,
    /// The contended resource.
    pub resource_id: ResourceId,
    /// The sub-resource named at request time.
    pub sub_resource_id: Option<SubResourceId>,
    /// Initial status (`WAITING` or `ACTIVE`).
    pub status: TokenStatus,
    /// Initial queue position (0 when active).
    pub queue_position: i32,
    /// Initial wait estimate (0 when active).
    pub estimated_wait_seconds: i64,
    /// Mint time.
    pub issued_at: DateTime<Utc>,
    /// Absolute ceiling.
    pub expires_at: DateTime<Utc>,
    /// Active window end, set only when minted directly as active.
    pub active_window_expires_at: Option<DateTime<Utc>>,
}
