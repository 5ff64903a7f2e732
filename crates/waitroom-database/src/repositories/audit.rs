//! Audit log repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::events::DomainEvent;
use waitroom_core::result::AppResult;
use waitroom_core::traits::AuditSink;
use waitroom_core::types::{OwnerId, ResourceId};

/// A stored admission event.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLogEntry {
    /// Event ID.
    pub id: Uuid,
    /// Event name, e.g. `token.activated`.
    pub event: String,
    /// Resource the event concerns.
    pub resource_id: ResourceId,
    /// Owner, when the event concerns one.
    pub owner_id: Option<OwnerId>,
    /// Token, when the event concerns one.
    pub token_id: Option<Uuid>,
    /// Full event payload.
    pub payload: serde_json::Value,
    /// When the event occurred.
    pub created_at: DateTime<Utc>,
}

/// Repository for the `admission_audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    /// Create a new audit log repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent events for a resource, newest first.
    pub async fn recent_for_resource(
        &self,
        resource: ResourceId,
        limit: i64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM admission_audit_log WHERE resource_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(resource)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list audit entries", e))
    }
}

#[async_trait]
impl AuditSink for AuditLogRepository {
    async fn record(&self, event: &DomainEvent) -> AppResult<()> {
        let payload = serde_json::to_value(&event.payload)?;
        sqlx::query(
            "INSERT INTO admission_audit_log (id, event, resource_id, owner_id, token_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.payload.name())
        .bind(event.payload.resource_id())
        .bind(event.payload.owner_id())
        .bind(event.payload.token_id())
        .bind(payload)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to write audit entry", e))?;
        Ok(())
    }
}
