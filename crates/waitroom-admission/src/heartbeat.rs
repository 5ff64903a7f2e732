//! Per-session liveness records.
//!
//! A heartbeat is a cache entry keyed by (owner, resource, sub-resource)
//! whose value is the last-seen timestamp and whose TTL is the inactivity
//! window. Staleness is judged from the stored timestamp against the
//! service clock, so a record the cache has not evicted yet still counts
//! as dead once the window has passed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use waitroom_cache::{CacheManager, keys};
use waitroom_core::result::AppResult;
use waitroom_core::traits::CacheProvider;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::HeartbeatKey;

/// A heartbeat as found in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRecord {
    /// Which session.
    pub key: HeartbeatKey,
    /// Last-seen time, `None` if the stored value is unreadable.
    pub last_seen: Option<DateTime<Utc>>,
}

impl HeartbeatRecord {
    /// Whether the record is older than `window` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_seen {
            Some(seen) => now.signed_duration_since(seen).to_std().is_ok_and(|age| age >= window),
            None => true,
        }
    }
}

/// Reads and writes heartbeat records through the cache.
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    cache: CacheManager,
    window: Duration,
}

impl HeartbeatTracker {
    /// Creates a tracker whose records live for `window`.
    pub fn new(cache: CacheManager, window: Duration) -> Self {
        Self { cache, window }
    }

    /// The inactivity window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record that the session was seen at `now`.
    pub async fn beat(&self, key: &HeartbeatKey, now: DateTime<Utc>) -> AppResult<()> {
        self.cache
            .set(&keys::heartbeat(key), &now.to_rfc3339(), self.window)
            .await
    }

    /// Delete the record. Returns `true` if one existed.
    pub async fn remove(&self, key: &HeartbeatKey) -> AppResult<bool> {
        self.cache.delete(&keys::heartbeat(key)).await
    }

    /// Last-seen time of the session, if a readable record exists.
    pub async fn last_seen(&self, key: &HeartbeatKey) -> AppResult<Option<DateTime<Utc>>> {
        let value = self.cache.get(&keys::heartbeat(key)).await?;
        Ok(value.and_then(|raw| parse_timestamp(key, &raw)))
    }

    /// Whether the session has a record younger than the window.
    pub async fn is_live(&self, key: &HeartbeatKey, now: DateTime<Utc>) -> AppResult<bool> {
        let last_seen = self.last_seen(key).await?;
        Ok(last_seen.is_some_and(|seen| {
            !HeartbeatRecord {
                key: *key,
                last_seen: Some(seen),
            }
            .is_stale(now, self.window)
        }))
    }

    /// Sessions on the resource with a record younger than the window.
    pub async fn live_for_resource(
        &self,
        resource: ResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<HeartbeatKey>> {
        let mut live = Vec::new();
        for cache_key in self
            .cache
            .keys(&keys::heartbeat_resource_pattern(resource))
            .await?
        {
            let Some(key) = keys::parse_heartbeat(&cache_key) else {
                continue;
            };
            if key.resource_id == resource && self.is_live(&key, now).await? {
                live.push(key);
            }
        }
        Ok(live)
    }

    /// Whether `owner` has any live session on the resource, whatever its
    /// sub-resource.
    pub async fn owner_is_live(
        &self,
        owner: OwnerId,
        resource: ResourceId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let live = self.live_for_resource(resource, now).await?;
        Ok(live.iter().any(|key| key.owner_id == owner))
    }

    /// Every record in the cache.
    pub async fn all(&self) -> AppResult<Vec<HeartbeatRecord>> {
        let mut records = Vec::new();
        for cache_key in self.cache.keys(&keys::heartbeat_pattern()).await? {
            let Some(key) = keys::parse_heartbeat(&cache_key) else {
                warn!(key = %cache_key, "Ignoring malformed heartbeat key");
                continue;
            };
            // The record may have expired between listing and reading.
            if let Some(raw) = self.cache.get(&cache_key).await? {
                records.push(HeartbeatRecord {
                    key,
                    last_seen: parse_timestamp(&key, &raw),
                });
            }
        }
        Ok(records)
    }

    /// Delete every record. Returns the number deleted.
    pub async fn clear_all(&self) -> AppResult<u64> {
        self.cache.delete_pattern(&keys::heartbeat_pattern()).await
    }
}

fn parse_timestamp(key: &HeartbeatKey, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!(heartbeat = %key, error = %e, "Unreadable heartbeat timestamp");
            None
        }
    }
}
