//! In-memory slot counter using a Tokio mutex for single-node deployments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use waitroom_core::result::AppResult;
use waitroom_core::types::ResourceId;

use super::{AcquireResult, ActiveSlotCounter};

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    count: u32,
    expires_at: Instant,
}

/// In-memory slot counter with a rolling per-entry TTL.
///
/// Suitable for single-node deployments only.
#[derive(Debug, Clone)]
pub struct MemorySlotCounter {
    entries: Arc<Mutex<HashMap<ResourceId, SlotEntry>>>,
    ttl: Duration,
}

impl MemorySlotCounter {
    /// Creates a counter whose entries expire `ttl` after their last mutation.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn live(entries: &mut HashMap<ResourceId, SlotEntry>, resource: ResourceId) -> Option<u32> {
        let now = Instant::now();
        match entries.get(&resource) {
            Some(entry) if entry.expires_at > now => Some(entry.count),
            Some(_) => {
                entries.remove(&resource);
                None
            }
            None => None,
        }
    }

    fn store(&self, entries: &mut HashMap<ResourceId, SlotEntry>, resource: ResourceId, count: u32) {
        entries.insert(
            resource,
            SlotEntry {
                count,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[async_trait]
impl ActiveSlotCounter for MemorySlotCounter {
    async fn current(&self, resource: ResourceId) -> AppResult<Option<u32>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, resource))
    }

    async fn try_acquire(&self, resource: ResourceId, cap: u32) -> AppResult<AcquireResult> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, resource) {
            None => Ok(AcquireResult::Untracked),
            Some(count) if count >= cap => Ok(AcquireResult::Full(count)),
            Some(count) => {
                self.store(&mut entries, resource, count + 1);
                Ok(AcquireResult::Granted(count + 1))
            }
        }
    }

    async fn release(&self, resource: ResourceId) -> AppResult<u32> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, resource) {
            Some(count) => {
                let next = count.saturating_sub(1);
                self.store(&mut entries, resource, next);
                Ok(next)
            }
            None => Ok(0),
        }
    }

    async fn resync(&self, resource: ResourceId, value: u32) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        self.store(&mut entries, resource, value);
        Ok(())
    }

    async fn remove(&self, resource: ResourceId) -> AppResult<bool> {
        let mut entries = self.entries.lock().await;
        let existed = Self::live(&mut entries, resource).is_some();
        entries.remove(&resource);
        Ok(existed)
    }

    async fn tracked_resources(&self) -> AppResult<Vec<ResourceId>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        let mut resources: Vec<ResourceId> = entries.keys().copied().collect();
        resources.sort();
        Ok(resources)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: ResourceId = ResourceId::new(1);

    #[tokio::test]
    async fn test_acquire_respects_cap() {
        let counter = MemorySlotCounter::new(Duration::from_secs(600));
        assert_eq!(counter.try_acquire(R, 2).await.unwrap(), AcquireResult::Untracked);

        counter.resync(R, 0).await.unwrap();
        assert_eq!(counter.try_acquire(R, 2).await.unwrap(), AcquireResult::Granted(1));
        assert_eq!(counter.try_acquire(R, 2).await.unwrap(), AcquireResult::Granted(2));
        assert_eq!(counter.try_acquire(R, 2).await.unwrap(), AcquireResult::Full(2));
        assert_eq!(counter.current(R).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_release_floors_at_zero_and_keeps_missing_entries_missing() {
        let counter = MemorySlotCounter::new(Duration::from_secs(600));
        assert_eq!(counter.release(R).await.unwrap(), 0);
        assert_eq!(counter.current(R).await.unwrap(), None);

        counter.resync(R, 1).await.unwrap();
        assert_eq!(counter.release(R).await.unwrap(), 0);
        assert_eq!(counter.release(R).await.unwrap(), 0);
        assert_eq!(counter.current(R).await.unwrap(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let counter = MemorySlotCounter::new(Duration::from_secs(10));
        counter.resync(R, 3).await.unwrap();
        assert_eq!(counter.tracked_resources().await.unwrap(), vec![R]);

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(counter.current(R).await.unwrap(), None);
        assert!(counter.tracked_resources().await.unwrap().is_empty());
        assert!(!counter.remove(R).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_exceeds_cap() {
        let counter = MemorySlotCounter::new(Duration::from_secs(600));
        counter.resync(R, 0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                counter.try_acquire(R, 5).await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if let AcquireResult::Granted(_) = handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(counter.current(R).await.unwrap(), Some(5));
    }
}
