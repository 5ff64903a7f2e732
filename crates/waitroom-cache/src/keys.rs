//! Cache key builders for all waiting-room cache entries.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses. Providers add their own
//! deployment prefix on top of these.

use waitroom_core::types::ResourceId;
use waitroom_entity::HeartbeatKey;

const HEARTBEAT: &str = "heartbeat";
const ACTIVE_TOKENS: &str = "active_tokens";

// ── Heartbeat keys ─────────────────────────────────────────

/// Cache key for one heartbeat record.
pub fn heartbeat(key: &HeartbeatKey) -> String {
    format!("{HEARTBEAT}:{key}")
}

/// Pattern matching every heartbeat record.
pub fn heartbeat_pattern() -> String {
    format!("{HEARTBEAT}:*")
}

/// Pattern matching every heartbeat record on one resource.
pub fn heartbeat_resource_pattern(resource: ResourceId) -> String {
    format!("{HEARTBEAT}:*:{resource}:*")
}

/// Recover the heartbeat key from a full cache key.
pub fn parse_heartbeat(cache_key: &str) -> Option<HeartbeatKey> {
    cache_key
        .strip_prefix(HEARTBEAT)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(HeartbeatKey::parse)
}

// ── Active slot keys ───────────────────────────────────────

/// Cache key for the active-slot counter of a resource.
pub fn active_slots(resource: ResourceId) -> String {
    format!("{ACTIVE_TOKENS}:{resource}")
}

/// Pattern matching every active-slot counter.
pub fn active_slots_pattern() -> String {
    format!("{ACTIVE_TOKENS}:*")
}

/// Recover the resource from an active-slot counter key.
pub fn parse_active_slots(cache_key: &str) -> Option<ResourceId> {
    cache_key
        .strip_prefix(ACTIVE_TOKENS)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|id| id.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitroom_core::types::{OwnerId, SubResourceId};

    #[test]
    fn test_heartbeat_key_round_trip() {
        let key = HeartbeatKey::new(OwnerId::new(1), ResourceId::new(2), SubResourceId::new(3));
        let cache_key = heartbeat(&key);
        assert_eq!(cache_key, "heartbeat:1:2:3");
        assert_eq!(parse_heartbeat(&cache_key), Some(key));
        assert_eq!(parse_heartbeat("active_tokens:2"), None);
    }

    #[test]
    fn test_active_slots_key() {
        assert_eq!(active_slots(ResourceId::new(9)), "active_tokens:9");
        assert_eq!(parse_active_slots("active_tokens:9"), Some(ResourceId::new(9)));
        assert_eq!(parse_active_slots("active_tokens:x"), None);
    }
}
