//! Audit log command.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use waitroom_core::error::AppError;
use waitroom_core::types::ResourceId;
use waitroom_database::DatabasePool;
use waitroom_database::repositories::AuditLogRepository;

/// Arguments for `events`
#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Resource ID
    pub resource: ResourceId,

    /// Maximum number of events
    #[arg(long, default_value = "50")]
    pub limit: u32,
}

/// Audit event row
#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    /// Time
    at: String,
    /// Event
    event: String,
    /// Owner
    owner: String,
    /// Token ID
    token: String,
}

/// Print recent admission events
pub async fn events(args: &EventsArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = DatabasePool::connect(&config.database).await?;
    let repo = AuditLogRepository::new(pool.pool().clone());

    let entries = repo
        .recent_for_resource(args.resource, i64::from(args.limit))
        .await?;

    match format {
        OutputFormat::Json => output::print_item(&entries, format),
        OutputFormat::Table => {
            let rows: Vec<EventRow> = entries
                .iter()
                .map(|e| EventRow {
                    at: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    event: e.event.clone(),
                    owner: e.owner_id.map(|o| o.to_string()).unwrap_or_else(|| "-".into()),
                    token: e.token_id.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                })
                .collect();
            output::print_list(&rows, format);
        }
    }
    Ok(())
}
