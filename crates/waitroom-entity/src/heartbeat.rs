//! Heartbeat record key.

use std::fmt;

use serde::{Deserialize, Serialize};
use waitroom_core::types::{OwnerId, ResourceId, SubResourceId};

/// Identifies one liveness record: an owner's session on a sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeartbeatKey {
    /// The session owner.
    pub owner_id: OwnerId,
    /// The resource being held.
    pub resource_id: ResourceId,
    /// The sub-resource being viewed.
    pub sub_resource_id: SubResourceId,
}

impl HeartbeatKey {
    /// Build a key.
    pub fn new(owner_id: OwnerId, resource_id: ResourceId, sub_resource_id: SubResourceId) -> Self {
        Self {
            owner_id,
            resource_id,
            sub_resource_id,
        }
    }

    /// Parse the `{owner}:{resource}:{sub}` suffix of a heartbeat cache key.
    pub fn parse(suffix: &str) -> Option<Self> {
        let mut parts = suffix.split(':');
        let owner = parts.next()?.parse().ok()?;
        let resource = parts.next()?.parse().ok()?;
        let sub = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(owner, resource, sub))
    }
}

impl fmt::Display for HeartbeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.owner_id, self.resource_id, self.sub_resource_id
        )
    }
}
