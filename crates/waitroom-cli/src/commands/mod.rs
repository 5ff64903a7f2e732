//! CLI command definitions and dispatch.

pub mod audit;
pub mod maintenance;
pub mod migrate;
pub mod queue;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use waitroom_admission::bootstrap::AdmissionRuntime;
use waitroom_core::config::AppConfig;
use waitroom_core::error::AppError;
use waitroom_core::types::SystemClock;

/// Waitroom: virtual waiting room administration
#[derive(Debug, Parser)]
#[command(name = "waitroom-cli", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Show per-resource queue statistics
    Stats(queue::StatsArgs),
    /// Show the state of one admission token
    Status(queue::StatusArgs),
    /// Reconcile and promote waiters on a resource
    Process(queue::ProcessArgs),
    /// Run one reaper sweep
    Sweep,
    /// Delete old USED tokens
    Purge(maintenance::PurgeArgs),
    /// Delete every heartbeat and slot counter entry
    ClearSessions(maintenance::ClearSessionsArgs),
    /// Show recent admission events for a resource
    Events(audit::EventsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate => migrate::execute(&self.config).await,
            Commands::Stats(args) => queue::stats(args, &self.config, self.format).await,
            Commands::Status(args) => queue::status(args, &self.config, self.format).await,
            Commands::Process(args) => queue::process(args, &self.config).await,
            Commands::Sweep => maintenance::sweep(&self.config, self.format).await,
            Commands::Purge(args) => maintenance::purge(args, &self.config).await,
            Commands::ClearSessions(args) => {
                maintenance::clear_sessions(args, &self.config, self.format).await
            }
            Commands::Events(args) => audit::events(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load_file(config_path)
}

/// Helper: connect the admission service described by the configuration
pub async fn connect(config_path: &str) -> Result<(AppConfig, AdmissionRuntime), AppError> {
    let config = load_config(config_path)?;
    let runtime = AdmissionRuntime::connect(&config, Arc::new(SystemClock)).await?;
    Ok((config, runtime))
}
