//! Admission lifecycle events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OwnerId, ResourceId, SubResourceId};

/// Events describing token and session transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdmissionEvent {
    /// A token was issued.
    Created {
        /// Token ID.
        token_id: Uuid,
        /// Owner of the token.
        owner_id: OwnerId,
        /// Resource the token is for.
        resource_id: ResourceId,
        /// Whether the token was issued directly as active.
        active: bool,
        /// Queue position at issue time (0 when active).
        position: u32,
    },
    /// A waiting token took a free slot.
    Activated {
        /// Token ID.
        token_id: Uuid,
        /// Owner of the token.
        owner_id: OwnerId,
        /// Resource the token is for.
        resource_id: ResourceId,
    },
    /// The protected operation completed.
    Used {
        /// Token ID.
        token_id: Uuid,
        /// Owner of the token.
        owner_id: OwnerId,
        /// Resource the token is for.
        resource_id: ResourceId,
    },
    /// A token expired.
    Expired {
        /// Token ID.
        token_id: Uuid,
        /// Owner of the token.
        owner_id: OwnerId,
        /// Resource the token is for.
        resource_id: ResourceId,
        /// Why the token expired.
        reason: String,
    },
    /// The owner cancelled a token.
    Cancelled {
        /// Token ID.
        token_id: Uuid,
        /// Owner of the token.
        owner_id: OwnerId,
        /// Resource the token is for.
        resource_id: ResourceId,
    },
    /// A heartbeat session was released and its slot returned.
    SessionReleased {
        /// Owner of the session.
        owner_id: OwnerId,
        /// Resource of the session.
        resource_id: ResourceId,
        /// Sub-resource of the session.
        sub_resource_id: SubResourceId,
    },
    /// The fast counter disagreed with the durable store and was reset.
    CounterResynced {
        /// Resource whose counter drifted.
        resource_id: ResourceId,
        /// Value the counter held (`None` when absent).
        cached: Option<u32>,
        /// Authoritative count from the store.
        durable: u32,
    },
}

impl AdmissionEvent {
    /// Short event name for logs and audit rows.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "token.created",
            Self::Activated { .. } => "token.activated",
            Self::Used { .. } => "token.used",
            Self::Expired { .. } => "token.expired",
            Self::Cancelled { .. } => "token.cancelled",
            Self::SessionReleased { .. } => "session.released",
            Self::CounterResynced { .. } => "counter.resynced",
        }
    }

    /// The resource the event concerns.
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Self::Created { resource_id, .. }
            | Self::Activated { resource_id, .. }
            | Self::Used { resource_id, .. }
            | Self::Expired { resource_id, .. }
            | Self::Cancelled { resource_id, .. }
            | Self::SessionReleased { resource_id, .. }
            | Self::CounterResynced { resource_id, .. } => *resource_id,
        }
    }

    /// The owner the event concerns, if any.
    pub fn owner_id(&self) -> Option<OwnerId> {
        match self {
            Self::Created { owner_id, .. }
            | Self::Activated { owner_id, .. }
            | Self::Used { owner_id, .. }
            | Self::Expired { owner_id, .. }
            | Self::Cancelled { owner_id, .. }
            | Self::SessionReleased { owner_id, .. } => Some(*owner_id),
            Self::CounterResynced { .. } => None,
        }
    }

    /// The token the event concerns, if any.
    pub fn token_id(&self) -> Option<Uuid> {
        match self {
            Self::Created { token_id, .. }
            | Self::Activated { token_id, .. }
            | Self::Used { token_id, .. }
            | Self::Expired { token_id, .. }
            | Self::Cancelled { token_id, .. } => Some(*token_id),
            Self::SessionReleased { .. } | Self::CounterResynced { .. } => None,
        }
    }
}
