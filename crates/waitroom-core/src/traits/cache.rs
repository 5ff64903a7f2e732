//! Cache provider trait for pluggable caching backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for cache backends (Redis or in-memory).
///
/// Values are plain strings. The provider is responsible for key
/// prefixing and TTL enforcement.
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Set a value with a TTL, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Check whether a key exists in the cache.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// List unprefixed keys matching a glob pattern (only `*` is supported).
    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>>;

    /// Delete all keys matching a pattern (e.g., `"heartbeat:*"`).
    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// Set the TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Check that the cache backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Flush all entries from the cache.
    async fn flush_all(&self) -> AppResult<()>;
}
