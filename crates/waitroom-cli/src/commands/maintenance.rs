//! Sweep, purge and reset commands.

use chrono::Duration;
use clap::Args;

use crate::output::{self, OutputFormat};
use waitroom_core::error::AppError;
use waitroom_worker::Reaper;

/// Arguments for `purge`
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Delete USED tokens older than this many hours; configured retention otherwise
    #[arg(long)]
    pub hours: Option<u32>,
}

/// Arguments for `clear-sessions`
#[derive(Debug, Args)]
pub struct ClearSessionsArgs {
    /// Skip confirmation
    #[arg(long)]
    pub force: bool,
}

/// Run one reaper sweep and print its report
pub async fn sweep(config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let (_, runtime) = super::connect(config_path).await?;
    let report = Reaper::new(runtime.service).sweep().await;
    output::print_item(&report, format);
    if report.failures > 0 {
        output::print_warning(&format!("{} item(s) failed, see logs", report.failures));
    }
    Ok(())
}

/// Delete old USED tokens
pub async fn purge(args: &PurgeArgs, config_path: &str) -> Result<(), AppError> {
    let (_, runtime) = super::connect(config_path).await?;
    let purged = match args.hours {
        Some(hours) => {
            let cutoff = runtime.service.now() - Duration::hours(i64::from(hours));
            runtime.service.purge_used(cutoff).await?
        }
        None => runtime.service.purge_past_retention().await?,
    };
    output::print_success(&format!("Purged {purged} used token(s)"));
    Ok(())
}

/// Delete every heartbeat and slot counter entry
pub async fn clear_sessions(
    args: &ClearSessionsArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let (config, runtime) = super::connect(config_path).await?;

    if config.cache.provider == "memory" {
        output::print_warning(
            "The memory cache provider is local to this process; nothing shared will be cleared.",
        );
    }

    if !args.force {
        let confirm = dialoguer::Confirm::new()
            .with_prompt("Delete ALL heartbeats and slot counters?")
            .default(false)
            .interact()
            .map_err(|e| AppError::internal(format!("Input error: {e}")))?;

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let cleared = runtime.service.clear_all_sessions().await?;
    output::print_item(&cleared, format);
    Ok(())
}
