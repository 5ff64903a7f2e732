//! Redis cache provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::result::AppResult;
use waitroom_core::traits::CacheProvider;

use super::client::RedisClient;

/// Redis-backed cache provider.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    /// Create a new Redis cache provider.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// The underlying client, for callers that run scripts.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
    }

    async fn full_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let full_pattern = self.client.prefixed_key(pattern);
        let mut conn = self.client.conn_mut();
        redis::cmd("KEYS")
            .arg(&full_pattern)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)
    }
}

/// Redis `SET EX` rejects a zero TTL.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: Option<String> = conn.get(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let _: () = conn
            .set_ex(&full_key, value, ttl_secs(ttl))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(&full_key).await.map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: bool = conn.exists(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        Ok(self
            .full_keys(pattern)
            .await?
            .iter()
            .map(|key| self.client.unprefixed_key(key).to_string())
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str) -> AppResult<u64> {
        let keys = self.full_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.client.conn_mut();
        let count: u64 = conn.del(&keys).await.map_err(Self::map_err)?;

        debug!(pattern, count, "Deleted keys matching pattern");
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn_mut();
        let result: bool = conn
            .expire(&full_key, ttl_secs(ttl) as i64)
            .await
            .map_err(Self::map_err)?;
        Ok(result)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }

    async fn flush_all(&self) -> AppResult<()> {
        // Only our prefix, never the whole server.
        self.delete_pattern("*").await?;
        Ok(())
    }
}
