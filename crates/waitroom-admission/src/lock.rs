//! Per-resource serialization of admission decisions.
//!
//! Decisions for the same resource never interleave; decisions for
//! different resources proceed independently.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use waitroom_core::types::ResourceId;

/// A table of per-resource async mutexes.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    locks: DashMap<ResourceId, Arc<Mutex<()>>>,
}

impl ResourceLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the resource.
    ///
    /// The mutex is not reentrant: code holding the guard must not call
    /// back into anything that acquires the same resource.
    pub async fn acquire(&self, resource: ResourceId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(resource)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns the number dropped.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of resources with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
