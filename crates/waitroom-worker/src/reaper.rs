//! Periodic reclamation of slots held by expired tokens and dead sessions.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use waitroom_admission::AdmissionService;
use waitroom_core::result::AppResult;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stale heartbeats handed to session release.
    pub sessions_released: u32,
    /// Tokens past their overall or active-window expiry, including stale
    /// waiters skipped while refilling freed slots.
    pub tokens_expired: u32,
    /// Active tokens whose heartbeat disappeared.
    pub abandoned_expired: u32,
    /// Slot counter entries dropped for lack of a live session.
    pub orphan_counters: u32,
    /// Lock table entries nobody held.
    pub locks_pruned: u32,
    /// Items that failed and were skipped.
    pub failures: u32,
}

impl SweepReport {
    /// Whether the sweep changed anything.
    pub fn is_noop(&self) -> bool {
        self.sessions_released == 0
            && self.tokens_expired == 0
            && self.abandoned_expired == 0
            && self.orphan_counters == 0
    }
}

/// The periodic sweep.
///
/// Every step works item by item: a failure is logged and counted, and the
/// sweep moves on to the next item.
#[derive(Debug, Clone)]
pub struct Reaper {
    service: Arc<AdmissionService>,
}

impl Reaper {
    /// Creates a reaper over the given service.
    pub fn new(service: Arc<AdmissionService>) -> Self {
        Self { service }
    }

    /// Run one full sweep.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        self.release_stale_sessions(&mut report).await;
        self.expire_overdue_tokens(&mut report).await;
        self.expire_abandoned_tokens(&mut report).await;
        self.drop_orphan_counters(&mut report).await;
        report.locks_pruned = u32::try_from(self.service.locks().prune()).unwrap_or(u32::MAX);

        if report.is_noop() && report.failures == 0 {
            debug!("Reaper sweep found nothing to do");
        } else {
            info!(
                sessions_released = report.sessions_released,
                tokens_expired = report.tokens_expired,
                abandoned_expired = report.abandoned_expired,
                orphan_counters = report.orphan_counters,
                locks_pruned = report.locks_pruned,
                failures = report.failures,
                "Reaper sweep complete"
            );
        }
        report
    }

    async fn bounded<T>(&self, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.service.config().store_timeout(), call).await?
    }

    async fn release_stale_sessions(&self, report: &mut SweepReport) {
        let tracker = self.service.tracker();
        let records = match self.bounded(tracker.all()).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to list heartbeats");
                report.failures += 1;
                return;
            }
        };

        let now = self.service.now();
        for record in records {
            if !record.is_stale(now, tracker.window()) {
                continue;
            }
            debug!(heartbeat = %record.key, last_seen = ?record.last_seen, "Heartbeat is stale");
            let key = record.key;
            self.service
                .release_session(key.owner_id, key.resource_id, key.sub_resource_id)
                .await;
            report.sessions_released += 1;
        }
    }

    async fn expire_overdue_tokens(&self, report: &mut SweepReport) {
        let now = self.service.now();
        let overdue = match self.bounded(self.service.store().find_expired(now)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to list expired tokens");
                report.failures += 1;
                return;
            }
        };

        for token in overdue {
            match self.service.expire_token(&token, "expired").await {
                Ok(expired) => report.tokens_expired += expired,
                Err(e) => {
                    warn!(token_id = %token.id, resource_id = %token.resource_id, error = %e, "Failed to expire token");
                    report.failures += 1;
                }
            }
        }
    }

    async fn expire_abandoned_tokens(&self, report: &mut SweepReport) {
        let active = match self.bounded(self.service.store().active_tokens()).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Failed to list active tokens");
                report.failures += 1;
                return;
            }
        };

        let now = self.service.now();
        let window = self.service.tracker().window();
        for token in active {
            if token.sub_resource_id.is_none() {
                continue;
            }
            let Some(activated_at) = token.activated_at else {
                continue;
            };
            let past_window = now
                .signed_duration_since(activated_at)
                .to_std()
                .is_ok_and(|age| age >= window);
            if !past_window {
                continue;
            }

            // A repeat request may have moved the session to another sub-resource.
            let beating = self.service.tracker().owner_is_live(
                token.owner_id,
                token.resource_id,
                now,
            );
            match self.bounded(beating).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(token_id = %token.id, resource_id = %token.resource_id, error = %e, "Failed to read heartbeats");
                    report.failures += 1;
                    continue;
                }
            }

            match self.service.expire_token(&token, "heartbeat lost").await {
                Ok(0) => {}
                Ok(expired) => {
                    report.abandoned_expired += 1;
                    report.tokens_expired += expired - 1;
                }
                Err(e) => {
                    warn!(token_id = %token.id, resource_id = %token.resource_id, error = %e, "Failed to expire abandoned token");
                    report.failures += 1;
                }
            }
        }
    }

    async fn drop_orphan_counters(&self, report: &mut SweepReport) {
        let resources = match self.bounded(self.service.counter().tracked_resources()).await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Failed to list slot counters");
                report.failures += 1;
                return;
            }
        };

        for resource in resources {
            match self.service.drop_orphan_counter(resource).await {
                Ok(true) => report.orphan_counters += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(resource_id = %resource, error = %e, "Failed to check slot counter");
                    report.failures += 1;
                }
            }
        }
    }
}
