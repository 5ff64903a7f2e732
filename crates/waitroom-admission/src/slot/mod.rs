//! Fast, shared count of active holders per resource.
//!
//! The counter is a cache of the durable store's count of `ACTIVE` tokens.
//! Every mutation is a single atomic primitive of the backing store and
//! refreshes the entry's rolling TTL. A missing entry means "unknown", not
//! zero: callers must reseed it from the durable store before trusting it.

pub mod memory;
#[cfg(feature = "redis-slots")]
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use waitroom_core::result::AppResult;
use waitroom_core::types::ResourceId;

pub use memory::MemorySlotCounter;
#[cfg(feature = "redis-slots")]
pub use self::redis::RedisSlotCounter;

/// Outcome of a conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquireResult {
    /// A slot was taken; carries the new count.
    Granted(u32),
    /// The resource is at capacity; carries the current count.
    Full(u32),
    /// No counter entry exists for the resource.
    Untracked,
}

/// Atomic per-resource active-slot counter.
#[async_trait]
pub trait ActiveSlotCounter: Send + Sync + std::fmt::Debug {
    /// Current count, or `None` when the entry is missing or expired.
    async fn current(&self, resource: ResourceId) -> AppResult<Option<u32>>;

    /// Increment only if the count is below `cap`.
    async fn try_acquire(&self, resource: ResourceId, cap: u32) -> AppResult<AcquireResult>;

    /// Decrement, never below zero. A missing entry stays missing and reports 0.
    async fn release(&self, resource: ResourceId) -> AppResult<u32>;

    /// Overwrite the count with an authoritative value.
    async fn resync(&self, resource: ResourceId, value: u32) -> AppResult<()>;

    /// Drop the entry. Returns `true` if it existed.
    async fn remove(&self, resource: ResourceId) -> AppResult<bool>;

    /// Resources that currently have an entry.
    async fn tracked_resources(&self) -> AppResult<Vec<ResourceId>>;

    /// Check that the backing store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Dispatcher for slot counting strategies.
///
/// Switches between in-memory and Redis-based counting based on configuration.
#[derive(Debug, Clone)]
pub enum SlotCounterDispatch {
    /// In-memory counter (single node).
    Memory(MemorySlotCounter),
    /// Redis-based counter (multi-node).
    #[cfg(feature = "redis-slots")]
    Redis(RedisSlotCounter),
}

#[async_trait]
impl ActiveSlotCounter for SlotCounterDispatch {
    async fn current(&self, resource: ResourceId) -> AppResult<Option<u32>> {
        match self {
            Self::Memory(c) => c.current(resource).await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.current(resource).await,
        }
    }

    async fn try_acquire(&self, resource: ResourceId, cap: u32) -> AppResult<AcquireResult> {
        match self {
            Self::Memory(c) => c.try_acquire(resource, cap).await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.try_acquire(resource, cap).await,
        }
    }

    async fn release(&self, resource: ResourceId) -> AppResult<u32> {
        match self {
            Self::Memory(c) => c.release(resource).await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.release(resource).await,
        }
    }

    async fn resync(&self, resource: ResourceId, value: u32) -> AppResult<()> {
        match self {
            Self::Memory(c) => c.resync(resource, value).await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.resync(resource, value).await,
        }
    }

    async fn remove(&self, resource: ResourceId) -> AppResult<bool> {
        match self {
            Self::Memory(c) => c.remove(resource).await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.remove(resource).await,
        }
    }

    async fn tracked_resources(&self) -> AppResult<Vec<ResourceId>> {
        match self {
            Self::Memory(c) => c.tracked_resources().await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.tracked_resources().await,
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        match self {
            Self::Memory(c) => c.health_check().await,
            #[cfg(feature = "redis-slots")]
            Self::Redis(c) => c.health_check().await,
        }
    }
}
