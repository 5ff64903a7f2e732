//! Redis-based slot counter using Lua scripts for atomicity.
//!
//! Suitable for multi-node deployments.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use waitroom_cache::keys;
use waitroom_cache::redis::RedisClient;
use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::result::AppResult;
use waitroom_core::types::ResourceId;

use super::{AcquireResult, ActiveSlotCounter};

/// Lua script for an atomic conditional increment.
///
/// KEYS[1] = counter key
/// ARGV[1] = cap
/// ARGV[2] = ttl seconds
///
/// Returns `{status, count}`:
///   1 = granted (count is the new value)
///   0 = full (count is the current value)
///  -1 = no entry
const ACQUIRE_SCRIPT: &str = r#"
    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return {-1, 0}
    end

    local current = tonumber(raw)
    if current >= tonumber(ARGV[1]) then
        return {0, current}
    end

    local next = redis.call('INCR', KEYS[1])
    redis.call('EXPIRE', KEYS[1], ARGV[2])
    return {1, next}
"#;

/// Lua script for an atomic decrement floored at zero.
///
/// KEYS[1] = counter key
/// ARGV[1] = ttl seconds
///
/// Returns the new value, or -1 when there is no entry.
const RELEASE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end

    local next = redis.call('DECR', KEYS[1])
    if next < 0 then
        redis.call('SET', KEYS[1], 0)
        next = 0
    end
    redis.call('EXPIRE', KEYS[1], ARGV[1])
    return next
"#;

/// Redis-based slot counter for multi-node deployments.
#[derive(Debug, Clone)]
pub struct RedisSlotCounter {
    client: RedisClient,
    ttl_seconds: u64,
}

impl RedisSlotCounter {
    /// Creates a counter on an existing Redis client.
    pub fn new(client: RedisClient, ttl_seconds: u64) -> Self {
        Self {
            client,
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    fn key(&self, resource: ResourceId) -> String {
        self.client.prefixed_key(&keys::active_slots(resource))
    }

    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Cache, format!("Redis slot counter error: {e}"), e)
    }
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl ActiveSlotCounter for RedisSlotCounter {
    async fn current(&self, resource: ResourceId) -> AppResult<Option<u32>> {
        let mut conn = self.client.conn_mut();
        let value: Option<i64> = conn.get(self.key(resource)).await.map_err(Self::map_err)?;
        Ok(value.map(to_count))
    }

    async fn try_acquire(&self, resource: ResourceId, cap: u32) -> AppResult<AcquireResult> {
        let mut conn = self.client.conn_mut();
        let (status, count): (i64, i64) = redis::Script::new(ACQUIRE_SCRIPT)
            .key(self.key(resource))
            .arg(cap)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        match status {
            1 => Ok(AcquireResult::Granted(to_count(count))),
            0 => Ok(AcquireResult::Full(to_count(count))),
            -1 => Ok(AcquireResult::Untracked),
            other => Err(AppError::cache(format!(
                "Unexpected slot acquire result: {other}"
            ))),
        }
    }

    async fn release(&self, resource: ResourceId) -> AppResult<u32> {
        let mut conn = self.client.conn_mut();
        let next: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.key(resource))
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        if next < 0 {
            debug!(resource_id = %resource, "Slot release on untracked resource");
        }
        Ok(to_count(next))
    }

    async fn resync(&self, resource: ResourceId, value: u32) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = conn
            .set_ex(self.key(resource), value, self.ttl_seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn remove(&self, resource: ResourceId) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let removed: i64 = conn.del(self.key(resource)).await.map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn tracked_resources(&self) -> AppResult<Vec<ResourceId>> {
        let mut conn = self.client.conn_mut();
        let pattern = self.client.prefixed_key(&keys::active_slots_pattern());
        let found: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        let mut resources = Vec::with_capacity(found.len());
        for key in &found {
            match keys::parse_active_slots(self.client.unprefixed_key(key)) {
                Some(resource) => resources.push(resource),
                None => warn!(key = %key, "Ignoring malformed slot counter key"),
            }
        }
        resources.sort();
        Ok(resources)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
