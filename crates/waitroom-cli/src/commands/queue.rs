//! Queue inspection and processing commands.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use waitroom_core::error::AppError;
use waitroom_core::types::ResourceId;
use waitroom_entity::QueueStats;

/// Arguments for `stats`
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Only this resource; every resource with waiting or active tokens otherwise
    #[arg(long)]
    pub resource: Option<ResourceId>,
}

/// Arguments for `status`
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Token value
    pub token: String,
}

/// Arguments for `process`
#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Resource ID
    pub resource: ResourceId,
}

/// Queue statistics row
#[derive(Debug, Serialize, Tabled)]
struct StatsRow {
    /// Resource
    resource: i64,
    /// Waiting
    waiting: u64,
    /// Active
    active: u64,
    /// Used
    used: u64,
    /// Expired or cancelled
    expired: u64,
    /// Estimated wait for a newcomer
    #[tabled(rename = "eta (s)")]
    eta_seconds: u64,
}

impl From<&QueueStats> for StatsRow {
    fn from(stats: &QueueStats) -> Self {
        Self {
            resource: stats.resource_id.get(),
            waiting: stats.waiting,
            active: stats.active,
            used: stats.used,
            expired: stats.expired,
            eta_seconds: stats.average_wait_seconds,
        }
    }
}

/// Print queue statistics
pub async fn stats(args: &StatsArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let (_, runtime) = super::connect(config_path).await?;

    let stats = match args.resource {
        Some(resource) => vec![runtime.service.queue_stats(resource).await?],
        None => runtime.service.all_queue_stats().await?,
    };
    let rows: Vec<StatsRow> = stats.iter().map(StatsRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}

/// Print one token's state
pub async fn status(args: &StatusArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let (_, runtime) = super::connect(config_path).await?;
    let state = runtime.service.get_token_status(&args.token).await?;
    output::print_item(&state, format);
    Ok(())
}

/// Reconcile the counter and promote waiters on one resource
pub async fn process(args: &ProcessArgs, config_path: &str) -> Result<(), AppError> {
    let (_, runtime) = super::connect(config_path).await?;
    let promoted = runtime.service.force_process(args.resource).await?;
    output::print_success(&format!(
        "Resource {}: {promoted} waiter(s) promoted",
        args.resource
    ));
    Ok(())
}
