//! Identity lookups against the account and catalog tables.

use async_trait::async_trait;
use sqlx::PgPool;

use waitroom_core::error::{AppError, ErrorKind};
use waitroom_core::result::AppResult;
use waitroom_core::traits::IdentityDirectory;
use waitroom_core::types::{OwnerId, ResourceId};

/// Resolves owners against `users` and resources against `performances`.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: PgPool,
}

impl IdentityRepository {
    /// Create a new identity repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for IdentityRepository {
    async fn owner_exists(&self, owner: OwnerId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to look up owner", e))
    }

    async fn resource_exists(&self, resource: ResourceId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM performances WHERE performance_id = $1)",
        )
        .bind(resource)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to look up resource", e))
    }
}
