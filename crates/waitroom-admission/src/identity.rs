//! In-process identity directories.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use waitroom_core::result::AppResult;
use waitroom_core::traits::IdentityDirectory;
use waitroom_core::types::{OwnerId, ResourceId};

/// Identity directory held in memory.
///
/// `open()` accepts every identity; `restricted()` accepts only those
/// registered with [`add_owner`](Self::add_owner) and
/// [`add_resource`](Self::add_resource).
#[derive(Debug, Default)]
pub struct StaticIdentityDirectory {
    open: bool,
    owners: RwLock<HashSet<OwnerId>>,
    resources: RwLock<HashSet<ResourceId>>,
}

impl StaticIdentityDirectory {
    /// A directory that knows every identity.
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    /// A directory that knows only registered identities.
    pub fn restricted() -> Self {
        Self::default()
    }

    /// Register an owner.
    pub async fn add_owner(&self, owner: OwnerId) {
        self.owners.write().await.insert(owner);
    }

    /// Register a resource.
    pub async fn add_resource(&self, resource: ResourceId) {
        self.resources.write().await.insert(resource);
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn owner_exists(&self, owner: OwnerId) -> AppResult<bool> {
        Ok(self.open || self.owners.read().await.contains(&owner))
    }

    async fn resource_exists(&self, resource: ResourceId) -> AppResult<bool> {
        Ok(self.open || self.resources.read().await.contains(&resource))
    }
}
