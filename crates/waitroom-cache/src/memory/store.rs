//! In-memory cache implementation using the moka crate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use waitroom_core::config::MemoryCacheConfig;
use waitroom_core::result::AppResult;
use waitroom_core::traits::CacheProvider;

use crate::pattern::glob_match;

/// A cached value together with the TTL it was written with.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was last written with.
#[derive(Debug, Clone, Copy)]
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache provider using moka.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    cache: Cache<String, Entry>,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }

    fn matching_keys(&self, pattern: &str) -> Vec<String> {
        self.cache
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.cache.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        Ok(self.matching_keys(pattern))
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut count = 0u64;
        for key in self.matching_keys(pattern) {
            if self.cache.remove(&key).await.is_some() {
                count += 1;
            }
        }

        debug!(pattern, count, "Deleted keys matching pattern");
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.cache
                    .insert(
                        key.to_string(),
                        Entry {
                            value: entry.value,
                            ttl,
                        },
                    )
                    .await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn flush_all(&self) -> AppResult<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}
