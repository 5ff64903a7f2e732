//! Admission-control configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Knobs for the admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of concurrently active holders per resource.
    #[serde(default = "default_max_active")]
    pub max_active_per_resource: u32,
    /// Estimated wait per person ahead in line, in seconds.
    #[serde(default = "default_wait_per_person")]
    pub wait_seconds_per_person: u64,
    /// Seconds without a heartbeat before a session counts as abandoned.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
    /// Length of the active window granted on activation, in seconds.
    #[serde(default = "default_active_window")]
    pub active_window_seconds: u64,
    /// Absolute token lifetime regardless of state, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// Rolling TTL of the fast active-slot counter, in seconds.
    #[serde(default = "default_counter_ttl")]
    pub counter_ttl_seconds: u64,
    /// Upper bound on every external store call, in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// Recompute every waiter's position after each promotion.
    #[serde(default = "default_true")]
    pub eager_reposition: bool,
    /// How long `USED` tokens are retained before the retention sweep deletes them.
    #[serde(default = "default_used_retention")]
    pub used_retention_hours: u64,
}

impl AdmissionConfig {
    /// Inactivity window as a [`Duration`].
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }

    /// Rolling counter TTL as a [`Duration`].
    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.counter_ttl_seconds)
    }

    /// Store call timeout as a [`Duration`].
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Estimated wait for the given queue position.
    pub fn estimate_wait_seconds(&self, position: u32) -> u64 {
        u64::from(position) * self.wait_seconds_per_person
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_active_per_resource: default_max_active(),
            wait_seconds_per_person: default_wait_per_person(),
            inactivity_timeout_seconds: default_inactivity_timeout(),
            active_window_seconds: default_active_window(),
            token_ttl_seconds: default_token_ttl(),
            counter_ttl_seconds: default_counter_ttl(),
            store_timeout_ms: default_store_timeout(),
            eager_reposition: true,
            used_retention_hours: default_used_retention(),
        }
    }
}

fn default_max_active() -> u32 {
    3
}

fn default_wait_per_person() -> u64 {
    10
}

fn default_inactivity_timeout() -> u64 {
    120
}

fn default_active_window() -> u64 {
    600
}

fn default_token_ttl() -> u64 {
    7200
}

fn default_counter_ttl() -> u64 {
    600
}

fn default_store_timeout() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_used_retention() -> u64 {
    24
}
