//! PostgreSQL token repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::result::AppResult;
use waitroom_core::types::{OwnerId, ResourceId};
use waitroom_entity::{AdmissionToken, NewToken, StatusCounts, TokenStatus};

use crate::store::{PositionUpdate, TokenStore};

/// Repository for admission tokens in the `admission_tokens` table.
#[derive(Debug, Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    /// Create a new token repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

fn to_count(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn insert(&self, token: NewToken) -> AppResult<AdmissionToken> {
        let activated_at = (token.status == TokenStatus::Active).then_some(token.issued_at);
        sqlx::query_as::<_, AdmissionToken>(
            "INSERT INTO admission_tokens (id, token_value, owner_id, resource_id, sub_resource_id, \
             status, queue_position, estimated_wait_seconds, issued_at, expires_at, activated_at, \
             active_window_expires_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $9) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&token.token_value)
        .bind(token.owner_id)
        .bind(token.resource_id)
        .bind(token.sub_resource_id)
        .bind(token.status)
        .bind(token.queue_position)
        .bind(token.estimated_wait_seconds)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(activated_at)
        .bind(token.active_window_expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::with_source(
                ErrorKind::Conflict,
                "Owner already holds a live token for this resource",
                e,
            ),
            _ => AppError::with_source(ErrorKind::Database, "Failed to insert token", e),
        })
    }

    async fn find_by_value(&self, token_value: &str) -> AppResult<Option<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE token_value = $1",
        )
        .bind(token_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find token"))
    }

    async fn find_live(
        &self,
        owner: OwnerId,
        resource: ResourceId,
    ) -> AppResult<Option<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE owner_id = $1 AND resource_id = $2 \
             AND status IN ('WAITING', 'ACTIVE') ORDER BY seq DESC LIMIT 1",
        )
        .bind(owner)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find live token"))
    }

    async fn find_live_by_owner(&self, owner: OwnerId) -> AppResult<Vec<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE owner_id = $1 \
             AND status IN ('WAITING', 'ACTIVE') ORDER BY seq DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find owner tokens"))
    }

    async fn count_waiting_before(&self, resource: ResourceId, seq: i64) -> AppResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admission_tokens WHERE resource_id = $1 \
             AND status = 'WAITING' AND seq < $2",
        )
        .bind(resource)
        .bind(seq)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to count waiting tokens"))?;
        Ok(to_count(count))
    }

    async fn count_with_status(&self, resource: ResourceId, status: TokenStatus) -> AppResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admission_tokens WHERE resource_id = $1 AND status = $2",
        )
        .bind(resource)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to count tokens"))?;
        Ok(to_count(count))
    }

    async fn waiting_in_order(
        &self,
        resource: ResourceId,
        limit: Option<u32>,
    ) -> AppResult<Vec<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE resource_id = $1 AND status = 'WAITING' \
             ORDER BY seq ASC LIMIT $2",
        )
        .bind(resource)
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list waiting tokens"))
    }

    async fn active_tokens(&self) -> AppResult<Vec<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE status = 'ACTIVE' ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list active tokens"))
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<AdmissionToken>> {
        sqlx::query_as::<_, AdmissionToken>(
            "SELECT * FROM admission_tokens WHERE status IN ('WAITING', 'ACTIVE') \
             AND (expires_at <= $1 OR (status = 'ACTIVE' AND active_window_expires_at <= $1)) \
             ORDER BY seq ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find expired tokens"))
    }

    async fn activate(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE admission_tokens SET status = 'ACTIVE', queue_position = 0, \
             estimated_wait_seconds = 0, activated_at = $2, active_window_expires_at = $3, \
             updated_at = $2 WHERE id = $1 AND status = 'WAITING'",
        )
        .bind(id)
        .bind(now)
        .bind(window_until)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to activate token"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TokenStatus,
        to: TokenStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let used_at = (to == TokenStatus::Used).then_some(now);
        let result = sqlx::query(
            "UPDATE admission_tokens SET status = $3, queue_position = 0, \
             estimated_wait_seconds = 0, used_at = COALESCE($5, used_at), updated_at = $4 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .bind(used_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to transition token"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_positions(&self, updates: &[PositionUpdate]) -> AppResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        for (id, position, eta) in updates {
            sqlx::query(
                "UPDATE admission_tokens SET queue_position = $2, estimated_wait_seconds = $3 \
                 WHERE id = $1 AND status = 'WAITING'",
            )
            .bind(id)
            .bind(position)
            .bind(eta)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to update queue position"))?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit queue positions"))
    }

    async fn status_counts(&self, resource: ResourceId) -> AppResult<StatusCounts> {
        let rows: Vec<(TokenStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM admission_tokens WHERE resource_id = $1 GROUP BY status",
        )
        .bind(resource)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to count tokens by status"))?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            counts.add(status, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn resources_with_tokens(&self) -> AppResult<Vec<ResourceId>> {
        sqlx::query_scalar::<_, ResourceId>(
            "SELECT DISTINCT resource_id FROM admission_tokens \
             WHERE status IN ('WAITING', 'ACTIVE') ORDER BY resource_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list resources"))
    }

    async fn purge_used_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM admission_tokens WHERE status = 'USED' AND used_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to purge used tokens"))?;
        Ok(result.rows_affected())
    }
}
