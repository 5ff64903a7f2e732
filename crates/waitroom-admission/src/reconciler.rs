//! Counter reconciliation against the durable store.
//!
//! Detects and corrects drift between the fast slot counter and the
//! number of `ACTIVE` rows, which is always trusted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use waitroom_core::events::AdmissionEvent;
use waitroom_core::result::AppResult;
use waitroom_core::types::ResourceId;
use waitroom_database::TokenStore;
use waitroom_entity::TokenStatus;

use crate::audit::AuditTrail;
use crate::slot::ActiveSlotCounter;

/// Reconciles the slot counter with the token store.
#[derive(Debug, Clone)]
pub struct CounterReconciler {
    store: Arc<dyn TokenStore>,
    counter: Arc<dyn ActiveSlotCounter>,
    audit: AuditTrail,
}

impl CounterReconciler {
    /// Creates a new counter reconciler.
    pub fn new(
        store: Arc<dyn TokenStore>,
        counter: Arc<dyn ActiveSlotCounter>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            counter,
            audit,
        }
    }

    /// Read the durable active count and make the counter agree with it.
    ///
    /// `cached` is the counter value the caller observed (`None` if the
    /// entry was missing). Returns the durable count.
    pub async fn reconcile(
        &self,
        resource: ResourceId,
        cached: Option<u32>,
        now: DateTime<Utc>,
    ) -> AppResult<u32> {
        let durable = self
            .store
            .count_with_status(resource, TokenStatus::Active)
            .await?;

        match cached {
            Some(value) if value == durable => return Ok(durable),
            Some(value) => {
                warn!(
                    resource_id = %resource,
                    cached = value,
                    durable,
                    delta = i64::from(value) - i64::from(durable),
                    "Slot counter drift detected, trusting durable count"
                );
                self.audit
                    .emit(
                        now,
                        AdmissionEvent::CounterResynced {
                            resource_id: resource,
                            cached: Some(value),
                            durable,
                        },
                    )
                    .await;
            }
            None => {
                debug!(resource_id = %resource, durable, "Seeding slot counter");
            }
        }

        self.counter.resync(resource, durable).await?;
        Ok(durable)
    }
}
