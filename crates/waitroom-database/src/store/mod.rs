//! The authoritative token store.
//!
//! Every state change goes through a conditional transition: the update
//! only applies when the token is still in the expected status, and the
//! returned `bool` tells the caller whether *its* call performed it. Slot
//! accounting keys off that result, so a token leaving `ACTIVE` releases
//! exactly one slot no matter how many callers race to expire it.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::{AdmissionToken, NewToken, StatusCounts, TokenStatus};

pub use memory::MemoryTokenStore;

/// A queue position update: token, position, estimated wait in seconds.
pub type PositionUpdate = (Uuid, i32, i64);

/// Durable repository of admission tokens.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new token, assigning its id and issuance sequence.
    async fn insert(&self, token: NewToken) -> AppResult<AdmissionToken>;

    /// Find a token by its presented value.
    async fn find_by_value(&self, token_value: &str) -> AppResult<Option<AdmissionToken>>;

    /// The most recent `WAITING` or `ACTIVE` token for an owner on a resource.
    async fn find_live(
        &self,
        owner: OwnerId,
        resource: ResourceId,
    ) -> AppResult<Option<AdmissionToken>>;

    /// All `WAITING` or `ACTIVE` tokens held by an owner, newest first.
    async fn find_live_by_owner(&self, owner: OwnerId) -> AppResult<Vec<AdmissionToken>>;

    /// Number of `WAITING` tokens on the resource issued before `seq`.
    async fn count_waiting_before(&self, resource: ResourceId, seq: i64) -> AppResult<u32>;

    /// Number of tokens on the resource in the given status.
    async fn count_with_status(&self, resource: ResourceId, status: TokenStatus) -> AppResult<u32>;

    /// `WAITING` tokens on the resource in issuance order.
    async fn waiting_in_order(
        &self,
        resource: ResourceId,
        limit: Option<u32>,
    ) -> AppResult<Vec<AdmissionToken>>;

    /// Every `ACTIVE` token across all resources.
    async fn active_tokens(&self) -> AppResult<Vec<AdmissionToken>>;

    /// Live tokens past their overall ceiling or, when active, their active window.
    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<AdmissionToken>>;

    /// Move a `WAITING` token to `ACTIVE`. Returns `false` if it was no longer waiting.
    async fn activate(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window_until: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Move a token from `from` to `to`, clearing its queue fields and
    /// stamping `used_at` when `to` is `USED`. Returns `false` if the token
    /// was not in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: TokenStatus,
        to: TokenStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Rewrite queue positions and estimates of waiting tokens.
    async fn update_positions(&self, updates: &[PositionUpdate]) -> AppResult<()>;

    /// Token counts per status for a resource.
    async fn status_counts(&self, resource: ResourceId) -> AppResult<StatusCounts>;

    /// Resources that currently have `WAITING` or `ACTIVE` tokens.
    async fn resources_with_tokens(&self) -> AppResult<Vec<ResourceId>>;

    /// Delete `USED` tokens used before `cutoff`. Returns the number deleted.
    async fn purge_used_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
