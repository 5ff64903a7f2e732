//! Reaper configuration.

use serde::{Deserialize, Serialize};

/// Periodic sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether the periodic sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Cron expression (with seconds) for the `USED` token retention purge.
    #[serde(default = "default_retention_cron")]
    pub retention_cron: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_interval(),
            retention_cron: default_retention_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

fn default_retention_cron() -> String {
    "0 0 4 * * *".to_string()
}
