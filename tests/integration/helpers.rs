//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use waitroom_admission::audit::{AuditTrail, BroadcastAuditSink, TracingAuditSink};
use waitroom_admission::identity::StaticIdentityDirectory;
use waitroom_admission::slot::MemorySlotCounter;
use waitroom_admission::{AdmissionService, HeartbeatTracker};
use waitroom_cache::CacheManager;
use waitroom_core::config::AdmissionConfig;
use waitroom_core::error::AppError;
use waitroom_core::events::DomainEvent;
use waitroom_core::result::AppResult;
use waitroom_core::traits::IdentityDirectory;
use waitroom_core::types::{ManualClock, OwnerId, ResourceId, SubResourceId};
use waitroom_database::store::PositionUpdate;
use waitroom_database::{MemoryTokenStore, TokenStore};
use waitroom_entity::{AdmissionTicket, AdmissionToken, NewToken, StatusCounts, TokenState, TokenStatus};
use waitroom_worker::Reaper;

/// Sub-resource used when a test does not care which one.
pub const SUB: SubResourceId = SubResourceId::new(1);

/// An admission service over in-memory stores and a hand-driven clock.
pub struct TestRoom {
    /// The service under test
    pub service: Arc<AdmissionService>,
    /// Direct handle on the durable store
    pub store: Arc<MemoryTokenStore>,
    /// Service clock
    pub clock: ManualClock,
    events: BroadcastAuditSink,
}

impl TestRoom {
    /// A room with `max_active` slots per resource and default knobs otherwise.
    pub fn new(max_active: u32) -> Self {
        Self::with_config(AdmissionConfig {
            max_active_per_resource: max_active,
            ..AdmissionConfig::default()
        })
    }

    /// A room with the given admission configuration.
    pub fn with_config(config: AdmissionConfig) -> Self {
        Self::build(config, Arc::new(StaticIdentityDirectory::open()))
    }

    /// A room that knows only the given identities.
    pub fn with_identity(max_active: u32, identity: Arc<dyn IdentityDirectory>) -> Self {
        Self::build(
            AdmissionConfig {
                max_active_per_resource: max_active,
                ..AdmissionConfig::default()
            },
            identity,
        )
    }

    /// A room whose service talks to the store through a [`FlakyStore`].
    /// `store` still reaches the data directly.
    pub fn flaky(max_active: u32) -> (Self, Arc<FlakyStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let flaky = Arc::new(FlakyStore::new(Arc::clone(&store)));
        let room = Self::assemble(
            AdmissionConfig {
                max_active_per_resource: max_active,
                ..AdmissionConfig::default()
            },
            Arc::new(StaticIdentityDirectory::open()),
            store,
            flaky.clone(),
        );
        (room, flaky)
    }

    fn build(config: AdmissionConfig, identity: Arc<dyn IdentityDirectory>) -> Self {
        let store = Arc::new(MemoryTokenStore::new());
        Self::assemble(config, identity, store.clone(), store)
    }

    fn assemble(
        config: AdmissionConfig,
        identity: Arc<dyn IdentityDirectory>,
        store: Arc<MemoryTokenStore>,
        backing: Arc<dyn TokenStore>,
    ) -> Self {
        let clock = ManualClock::new(Utc::now());
        let events = BroadcastAuditSink::new(256);

        let mut audit = AuditTrail::new(config.store_timeout());
        audit.add_sink(Arc::new(TracingAuditSink));
        audit.add_sink(Arc::new(events.clone()));

        let tracker = HeartbeatTracker::new(CacheManager::in_memory(), config.inactivity_timeout());
        let service = AdmissionService::new(
            config.clone(),
            backing,
            Arc::new(MemorySlotCounter::new(config.counter_ttl())),
            tracker,
            identity,
            Arc::new(clock.clone()),
            audit,
        );

        Self {
            service: Arc::new(service),
            store,
            clock,
            events,
        }
    }

    /// Subscribe to events emitted from now on.
    pub fn events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Request admission for `owner` on `resource`.
    pub async fn request(&self, resource: i64, owner: i64) -> AdmissionTicket {
        self.service
            .request_admission(ResourceId::new(resource), SUB, OwnerId::new(owner))
            .await
            .expect("admission request failed")
    }

    /// Current state of the ticket's token.
    pub async fn state(&self, ticket: &AdmissionTicket) -> TokenState {
        self.service
            .get_token_status(token_of(ticket))
            .await
            .expect("token status failed")
    }

    /// The stored token behind a ticket.
    pub async fn stored(&self, ticket: &AdmissionTicket) -> AdmissionToken {
        self.store
            .find_by_value(token_of(ticket))
            .await
            .unwrap()
            .expect("token not stored")
    }

    /// Durable number of `ACTIVE` tokens on a resource.
    pub async fn durable_active(&self, resource: i64) -> u32 {
        self.store
            .count_with_status(ResourceId::new(resource), TokenStatus::Active)
            .await
            .unwrap()
    }

    /// Fast counter value of a resource.
    pub async fn counter(&self, resource: i64) -> Option<u32> {
        self.service
            .counter()
            .current(ResourceId::new(resource))
            .await
            .unwrap()
    }

    /// Current time on the service clock.
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.service.now()
    }

    /// A reaper over this room's service.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(Arc::clone(&self.service))
    }
}

/// Token value of a ticket that must carry one.
pub fn token_of(ticket: &AdmissionTicket) -> &str {
    ticket.token.as_deref().expect("ticket without token")
}

/// A memory store that can be told to fail activations and inserts, or to
/// stall position lookups past any timeout.
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<MemoryTokenStore>,
    /// Fail `activate`
    pub fail_activate: AtomicBool,
    /// Fail `insert`
    pub fail_insert: AtomicBool,
    /// Hang `count_waiting_before` for an hour before answering
    pub stall_positions: AtomicBool,
}

impl FlakyStore {
    /// Wraps `inner` with every fault switched off.
    pub fn new(inner: Arc<MemoryTokenStore>) -> Self {
        Self {
            inner,
            fail_activate: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            stall_positions: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn insert(&self, token: NewToken) -> AppResult<AdmissionToken> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return down();
        }
        self.inner.insert(token).await
    }

    async fn find_by_value(&self, token_value: &str) -> AppResult<Option<AdmissionToken>> {
        self.inner.find_by_value(token_value).await
    }

    async fn find_live(
        &self,
        owner: OwnerId,
        resource: ResourceId,
    ) -> AppResult<Option<AdmissionToken>> {
        self.inner.find_live(owner, resource).await
    }

    async fn find_live_by_owner(&self, owner: OwnerId) -> AppResult<Vec<AdmissionToken>> {
        self.inner.find_live_by_owner(owner).await
    }

    async fn count_waiting_before(&self, resource: ResourceId, seq: i64) -> AppResult<u32> {
        if self.stall_positions.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        self.inner.count_waiting_before(resource, seq).await
    }

    async fn count_with_status(
        &self,
        resource: ResourceId,
        status: TokenStatus,
    ) -> AppResult<u32> {
        self.inner.count_with_status(resource, status).await
    }

    async fn waiting_in_order(
        &self,
        resource: ResourceId,
        limit: Option<u32>,
    ) -> AppResult<Vec<AdmissionToken>> {
        self.inner.waiting_in_order(resource, limit).await
    }

    async fn active_tokens(&self) -> AppResult<Vec<AdmissionToken>> {
        self.inner.active_tokens().await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<AdmissionToken>> {
        self.inner.find_expired(now).await
    }

    async fn activate(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        window_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        if self.fail_activate.load(Ordering::SeqCst) {
            return down();
        }
        self.inner.activate(id, now, window_until).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TokenStatus,
        to: TokenStatus,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.transition(id, from, to, now).await
    }

    async fn update_positions(&self, updates: &[PositionUpdate]) -> AppResult<()> {
        self.inner.update_positions(updates).await
    }

    async fn status_counts(&self, resource: ResourceId) -> AppResult<StatusCounts> {
        self.inner.status_counts(resource).await
    }

    async fn resources_with_tokens(&self) -> AppResult<Vec<ResourceId>> {
        self.inner.resources_with_tokens().await
    }

    async fn purge_used_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.inner.purge_used_before(cutoff).await
    }
}

/// A token store whose every call fails.
#[derive(Debug, Default)]
pub struct FailingStore;

fn down<T>() -> AppResult<T> {
    Err(AppError::database("token store unavailable"))
}

#[async_trait]
impl TokenStore for FailingStore {
    async fn insert(&self, _token: NewToken) -> AppResult<AdmissionToken> {
        down()
    }

    async fn find_by_value(&self, _token_value: &str) -> AppResult<Option<AdmissionToken>> {
        down()
    }

    async fn find_live(
        &self,
        _owner: OwnerId,
        _resource: ResourceId,
    ) -> AppResult<Option<AdmissionToken>> {
        down()
    }

    async fn find_live_by_owner(&self, _owner: OwnerId) -> AppResult<Vec<AdmissionToken>> {
        down()
    }

    async fn count_waiting_before(&self, _resource: ResourceId, _seq: i64) -> AppResult<u32> {
        down()
    }

    async fn count_with_status(
        &self,
        _resource: ResourceId,
        _status: TokenStatus,
    ) -> AppResult<u32> {
        down()
    }

    async fn waiting_in_order(
        &self,
        _resource: ResourceId,
        _limit: Option<u32>,
    ) -> AppResult<Vec<AdmissionToken>> {
        down()
    }

    async fn active_tokens(&self) -> AppResult<Vec<AdmissionToken>> {
        down()
    }

    async fn find_expired(&self, _now: DateTime<Utc>) -> AppResult<Vec<AdmissionToken>> {
        down()
    }

    async fn activate(
        &self,
        _id: Uuid,
        _now: DateTime<Utc>,
        _window_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        down()
    }

    async fn transition(
        &self,
        _id: Uuid,
        _from: TokenStatus,
        _to: TokenStatus,
        _now: DateTime<Utc>,
    ) -> AppResult<bool> {
        down()
    }

    async fn update_positions(&self, _updates: &[PositionUpdate]) -> AppResult<()> {
        down()
    }

    async fn status_counts(&self, _resource: ResourceId) -> AppResult<StatusCounts> {
        down()
    }

    async fn resources_with_tokens(&self) -> AppResult<Vec<ResourceId>> {
        down()
    }

    async fn purge_used_before(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        down()
    }
}

/// A service whose durable store is down.
pub fn service_with_failing_store(max_active: u32) -> AdmissionService {
    let config = AdmissionConfig {
        max_active_per_resource: max_active,
        ..AdmissionConfig::default()
    };
    let tracker = HeartbeatTracker::new(CacheManager::in_memory(), config.inactivity_timeout());
    AdmissionService::new(
        config.clone(),
        Arc::new(FailingStore),
        Arc::new(MemorySlotCounter::new(config.counter_ttl())),
        tracker,
        Arc::new(StaticIdentityDirectory::open()),
        Arc::new(ManualClock::new(Utc::now())),
        AuditTrail::new(config.store_timeout()),
    )
}
