//! Wiring of the admission service from configuration.

use std::sync::Arc;

use tracing::info;

use waitroom_cache::CacheManager;
use waitroom_core::config::{AppConfig, IdentityMode};
use waitroom_core::error::AppError;
use waitroom_core::result::AppResult;
use waitroom_core::traits::IdentityDirectory;
use waitroom_core::types::Clock;
use waitroom_database::DatabasePool;
use waitroom_database::TokenStore;
use waitroom_database::repositories::{AuditLogRepository, IdentityRepository, TokenRepository};

use crate::audit::{AuditTrail, TracingAuditSink};
use crate::heartbeat::HeartbeatTracker;
use crate::identity::StaticIdentityDirectory;
use crate::service::AdmissionService;
use crate::slot::{MemorySlotCounter, SlotCounterDispatch};

/// A fully wired admission service and the pool it runs on.
#[derive(Debug, Clone)]
pub struct AdmissionRuntime {
    /// The admission service.
    pub service: Arc<AdmissionService>,
    /// The PostgreSQL pool backing the token store.
    pub database: DatabasePool,
}

impl AdmissionRuntime {
    /// Connect every store named in `config` and build the service.
    pub async fn connect(config: &AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let database = DatabasePool::connect(&config.database).await?;
        let pool = database.pool().clone();

        let store: Arc<dyn TokenStore> = Arc::new(TokenRepository::new(pool.clone()));
        let cache = CacheManager::new(&config.cache).await?;
        let counter = Arc::new(build_slot_counter(config).await?);
        let tracker = HeartbeatTracker::new(cache, config.admission.inactivity_timeout());

        let identity: Arc<dyn IdentityDirectory> = match config.identity.mode {
            IdentityMode::Database => Arc::new(IdentityRepository::new(pool.clone())),
            IdentityMode::Open => {
                info!("Identity checks disabled, every owner and resource is accepted");
                Arc::new(StaticIdentityDirectory::open())
            }
        };

        let mut audit = AuditTrail::new(config.admission.store_timeout());
        audit.add_sink(Arc::new(TracingAuditSink));
        audit.add_sink(Arc::new(AuditLogRepository::new(pool)));

        let service = AdmissionService::new(
            config.admission.clone(),
            store,
            counter,
            tracker,
            identity,
            clock,
            audit,
        );

        info!(
            max_active = config.admission.max_active_per_resource,
            cache = %config.cache.provider,
            "Admission service ready"
        );
        Ok(Self {
            service: Arc::new(service),
            database,
        })
    }
}

/// Select the slot counter backend from `cache.provider`.
pub async fn build_slot_counter(config: &AppConfig) -> AppResult<SlotCounterDispatch> {
    match config.cache.provider.as_str() {
        "memory" => Ok(SlotCounterDispatch::Memory(MemorySlotCounter::new(
            config.admission.counter_ttl(),
        ))),
        #[cfg(feature = "redis-slots")]
        "redis" => {
            let client = waitroom_cache::redis::RedisClient::connect(&config.cache.redis).await?;
            Ok(SlotCounterDispatch::Redis(crate::slot::RedisSlotCounter::new(
                client,
                config.admission.counter_ttl_seconds,
            )))
        }
        other => Err(AppError::configuration(format!(
            "Unknown slot counter provider: '{other}'. Supported: memory, redis"
        ))),
    }
}
