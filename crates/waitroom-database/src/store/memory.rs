//! In-memory token store for single-node development and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use waitroom_core::error::AppError;
use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::{AdmissionToken, NewToken, StatusCounts, TokenStatus};

use super::{PositionUpdate, TokenStore};

/// Token store backed by a map behind a `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<Uuid, AdmissionToken>>,
    seq: AtomicI64,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens in any status.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether the store holds no tokens.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }

    /// Overwrite a stored token. Lets tests stage states the service never produces.
    pub async fn put(&self, token: AdmissionToken) {
        self.tokens.write().await.insert(token.id, token);
    }
}

fn sorted_by_seq(mut tokens: Vec<AdmissionToken>) -> Vec<AdmissionToken> {
    tokens.sort_by_key(|t| t.seq);
    tokens
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: NewToken) -> AppResult<AdmissionToken> {
        let mut tokens = self.tokens.write().await;

        if tokens.values().any(|t| t.token_value == token.token_value) {
            return Err(AppError::conflict("Token value already exists"));
        }
        if tokens.values().any(|t| {
            t.is_live() && t.owner_id == token.owner_id && t.resource_id == token.resource_id
        }) {
            return Err(AppError::conflict(format!(
                "Owner {} already holds a live token for resource {}",
                token.owner_id, token.resource_id
            )));
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let activated_at = (token.status == TokenStatus::Active).then_some(token.issued_at);
        let record = AdmissionToken {
            id: Uuid::now_v7(),
            seq,
            token_value: token.token_value,
            owner_id: token.owner_id,
            resource_id: token.resource_id,
            sub_resource_id: token.sub_resource_id,
            status: token.status,
            queue_position: token.queue_position,
            estimated_wait_seconds: token.estimated_wait_seconds,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            activated_at,
            active_window_expires_at: token.active_window_expires_at,
            used_at: None,
            updated_at: token.issued_at,
        };
        tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_value(&self, token_value: &str) -> AppResult<Option<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .values()
            .find(|t| t.token_value == token_value)
            .cloned())
    }

    async fn find_live(
        &self,
        owner: OwnerId,
        resource: ResourceId,
    ) -> AppResult<Option<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens
            .values()
            .filter(|t| t.is_live() && t.owner_id == owner && t.resource_id == resource)
            .max_by_key(|t| t.seq)
            .cloned())
    }

    async fn find_live_by_owner(&self, owner: OwnerId) -> AppResult<Vec<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        let mut live = sorted_by_seq(
            tokens
                .values()
                .filter(|t| t.is_live() && t.owner_id == owner)
                .cloned()
                .collect(),
        );
        live.reverse();
        Ok(live)
    }

    async fn count_waiting_before(&self, resource: ResourceId, seq: i64) -> AppResult<u32> {
        let tokens = self.tokens.read().await;
        Ok(count(
            tokens
                .values()
                .filter(|t| {
                    t.resource_id == resource && t.status == TokenStatus::Waiting && t.seq < seq
                })
                .count(),
        ))
    }

    async fn count_with_status(&self, resource: ResourceId, status: TokenStatus) -> AppResult<u32> {
        let tokens = self.tokens.read().await;
        Ok(count(
            tokens
                .values()
                .filter(|t| t.resource_id == resource && t.status == status)
                .count(),
        ))
    }

    async fn waiting_in_order(
        &self,
        resource: ResourceId,
        limit: Option<u32>,
    ) -> AppResult<Vec<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        let mut waiting = sorted_by_seq(
            tokens
                .values()
                .filter(|t| t.resource_id == resource && t.status == TokenStatus::Waiting)
                .cloned()
                .collect(),
        );
        if let Some(limit) = limit {
            waiting.truncate(limit as usize);
        }
        Ok(waiting)
    }

    async fn active_tokens(&self) -> AppResult<Vec<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        Ok(sorted_by_seq(
            tokens
                .values()
                .filter(|t| t.status == TokenStatus::Active)
                .cloned()
                .collect(),
        ))
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<AdmissionToken>> {
        let tokens = self.tokens.read().await;
        Ok(sorted_by_seq(
            tokens
                .values()
                .filter(|t| t.is_live() && t.is_expired_at(now))
                .cloned()
                .collect(),
        ))
    }

    async fn activate(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.status == TokenStatus::Waiting => {
                token.status = TokenStatus::Active;
                token.queue_position = 0;
                token.estimated_wait_seconds = 0;
                token.activated_at = Some(now);
                token.active_window_expires_at = Some(window_until);
                token.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TokenStatus,
        to: TokenStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.status == from => {
                token.status = to;
                token.queue_position = 0;
                token.estimated_wait_seconds = 0;
                if to == TokenStatus::Used {
                    token.used_at = Some(now);
                }
                token.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_positions(&self, updates: &[PositionUpdate]) -> AppResult<()> {
        let mut tokens = self.tokens.write().await;
        for (id, position, eta) in updates {
            if let Some(token) = tokens.get_mut(id) {
                if token.status == TokenStatus::Waiting {
                    token.queue_position = *position;
                    token.estimated_wait_seconds = *eta;
                }
            }
        }
        Ok(())
    }

    async fn status_counts(&self, resource: ResourceId) -> AppResult<StatusCounts> {
        let tokens = self.tokens.read().await;
        let mut counts = StatusCounts::default();
        for token in tokens.values().filter(|t| t.resource_id == resource) {
            counts.add(token.status, 1);
        }
        Ok(counts)
    }

    async fn resources_with_tokens(&self) -> AppResult<Vec<ResourceId>> {
        let tokens = self.tokens.read().await;
        let resources: BTreeSet<ResourceId> = tokens
            .values()
            .filter(|t| t.is_live())
            .map(|t| t.resource_id)
            .collect();
        Ok(resources.into_iter().collect())
    }

    async fn purge_used_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| {
            !(t.status == TokenStatus::Used && t.used_at.is_some_and(|used| used < cutoff))
        });
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use waitroom_core::error::ErrorKind;

    fn new_token(value: &str, owner: i64, status: TokenStatus, now: DateTime<Utc>) -> NewToken {
        NewToken {
            token_value: value.to_string(),
            owner_id: OwnerId::new(owner),
            resource_id: ResourceId::new(1),
            sub_resource_id: None,
            status,
            queue_position: 0,
            estimated_wait_seconds: 0,
            issued_at: now,
            expires_at: now + Duration::hours(2),
            active_window_expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_seq() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let a = store
            .insert(new_token("a", 1, TokenStatus::Waiting, now))
            .await
            .unwrap();
        let b = store
            .insert(new_token("b", 2, TokenStatus::Waiting, now))
            .await
            .unwrap();
        assert!(b.seq > a.seq);
        assert_eq!(
            store
                .count_waiting_before(ResourceId::new(1), b.seq)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_second_live_token() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        store
            .insert(new_token("a", 1, TokenStatus::Waiting, now))
            .await
            .unwrap();
        let err = store
            .insert(new_token("b", 1, TokenStatus::Waiting, now))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let token = store
            .insert(new_token("a", 1, TokenStatus::Waiting, now))
            .await
            .unwrap();

        assert!(store.activate(token.id, now, now + Duration::minutes(10)).await.unwrap());
        assert!(!store.activate(token.id, now, now + Duration::minutes(10)).await.unwrap());

        assert!(store
            .transition(token.id, TokenStatus::Active, TokenStatus::Used, now)
            .await
            .unwrap());
        assert!(!store
            .transition(token.id, TokenStatus::Active, TokenStatus::Expired, now)
            .await
            .unwrap());

        let stored = store.find_by_value("a").await.unwrap().unwrap();
        assert_eq!(stored.status, TokenStatus::Used);
        assert_eq!(stored.used_at, Some(now));
    }

    #[tokio::test]
    async fn test_purge_only_old_used_tokens() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        let old = store
            .insert(new_token("old", 1, TokenStatus::Active, now))
            .await
            .unwrap();
        store
            .transition(old.id, TokenStatus::Active, TokenStatus::Used, now - Duration::days(2))
            .await
            .unwrap();
        store
            .insert(new_token("live", 2, TokenStatus::Waiting, now))
            .await
            .unwrap();

        let purged = store
            .purge_used_before(now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len().await, 1);
    }
}
