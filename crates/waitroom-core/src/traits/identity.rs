//! Lookup of externally owned identities.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{OwnerId, ResourceId};

/// Answers whether owners and resources exist.
///
/// The waiting room does not own these records; it only needs to reject
/// requests that name unknown ones.
#[async_trait]
pub trait IdentityDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Whether the owner exists.
    async fn owner_exists(&self, owner: OwnerId) -> AppResult<bool>;

    /// Whether the resource exists.
    async fn resource_exists(&self, resource: ResourceId) -> AppResult<bool>;
}
