//! Cron scheduler driving the reaper and the retention purge.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use waitroom_admission::AdmissionService;
use waitroom_core::config::ReaperConfig;
use waitroom_core::error::AppError;

use crate::reaper::Reaper;

/// Scheduler for the periodic maintenance tasks.
pub struct ReaperScheduler {
    scheduler: JobScheduler,
    service: Arc<AdmissionService>,
    config: ReaperConfig,
}

impl std::fmt::Debug for ReaperScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaperScheduler")
            .field("config", &self.config)
            .finish()
    }
}

impl ReaperScheduler {
    /// Create a scheduler; nothing runs until [`Self::start`].
    pub async fn new(service: Arc<AdmissionService>, config: ReaperConfig) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            service,
            config,
        })
    }

    /// Register the sweep and the retention purge.
    pub async fn register_default_tasks(&self) -> Result<(), AppError> {
        self.register_sweep().await?;
        self.register_retention_purge().await?;

        info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        info!("Reaper scheduler started");
        Ok(())
    }

    /// Shut the scheduler down.
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        info!("Reaper scheduler shut down");
        Ok(())
    }

    /// Reaper sweep, every `interval_seconds`
    async fn register_sweep(&self) -> Result<(), AppError> {
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        let reaper = Reaper::new(Arc::clone(&self.service));
        let job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let reaper = reaper.clone();
            Box::pin(async move {
                debug!("Running reaper sweep");
                reaper.sweep().await;
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create reaper schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add reaper schedule: {e}")))?;

        info!(interval_seconds = interval.as_secs(), "Registered: reaper sweep");
        Ok(())
    }

    /// Purge of old `USED` tokens, on `retention_cron`
    async fn register_retention_purge(&self) -> Result<(), AppError> {
        let service = Arc::clone(&self.service);
        let job = CronJob::new_async(self.config.retention_cron.as_str(), move |_uuid, _lock| {
            let service = Arc::clone(&service);
            Box::pin(async move {
                if let Err(e) = service.purge_past_retention().await {
                    error!(error = %e, "Retention purge failed");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid retention cron '{}': {e}",
                self.config.retention_cron
            ))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add retention schedule: {e}")))?;

        info!(cron = %self.config.retention_cron, "Registered: retention purge");
        Ok(())
    }
}
