//! Waitroom Reaper daemon.
//!
//! Connects the admission stores, applies migrations and runs the periodic
//! sweep that reclaims abandoned slots until a shutdown signal arrives.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use waitroom_admission::bootstrap::AdmissionRuntime;
use waitroom_core::config::AppConfig;
use waitroom_core::error::AppError;
use waitroom_core::types::SystemClock;
use waitroom_worker::{Reaper, ReaperScheduler};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Reaper daemon failed");
        std::process::exit(1);
    }
}

/// Load configuration for the environment named by `WAITROOM_ENV`.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("WAITROOM_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting waitroom reaper");

    // ── Stores ───────────────────────────────────────────────────
    let runtime = AdmissionRuntime::connect(&config, Arc::new(SystemClock)).await?;

    info!("Running database migrations...");
    waitroom_database::migration::run_migrations(runtime.database.pool()).await?;
    info!("Database migrations complete");

    if !config.reaper.enabled {
        warn!("Reaper disabled by configuration, exiting");
        runtime.database.close().await;
        return Ok(());
    }

    // ── First sweep, then the schedule ───────────────────────────
    let report = Reaper::new(Arc::clone(&runtime.service)).sweep().await;
    info!(?report, "Startup sweep finished");

    let mut scheduler =
        ReaperScheduler::new(Arc::clone(&runtime.service), config.reaper.clone()).await?;
    scheduler.register_default_tasks().await?;
    scheduler.start().await?;

    // ── Wait for shutdown ────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping reaper...");
        let _ = shutdown_tx.send(true);
    });

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    runtime.database.close().await;

    info!("Waitroom reaper shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
