use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::adapter::{EnsembleWeightAdapter, RetrainReport};

/// Drives [`EnsembleWeightAdapter::retrain`] on the configured cron schedule.
pub struct WeightRetrainScheduler {
    adapter: Arc<EnsembleWeightAdapter>,
    cron_schedule: String,
    enabled: bool,
}

impl WeightRetrainScheduler {
    /// Creates a new retrain scheduler.
    #[must_use]
    pub fn new(adapter: Arc<EnsembleWeightAdapter>, cron_schedule: impl Into<String>, enabled: bool) -> Self {
        Self {
            adapter,
            cron_schedule: cron_schedule.into(),
            enabled,
        }
    }

    /// Starts the scheduler and retrains according to the cron schedule.
    ///
    /// Never returns while enabled.
    ///
    /// # Errors
    /// Returns an error if the cron expression is invalid or the scheduler fails to start.
    pub async fn start(self) -> Result<()> {
        if !self.enabled {
            info!("Weight retrain scheduler is disabled");
            return Ok(());
        }

        info!(cron = %self.cron_schedule, "Starting weight retrain scheduler");

        let scheduler = JobScheduler::new().await?;
        let adapter = self.adapter.clone();

        let job = Job::new_async(self.cron_schedule.as_str(), move |_uuid, _lock| {
            let adapter = adapter.clone();
            Box::pin(async move {
                match adapter.retrain(Utc::now()).await {
                    Ok(Some(report)) => info!(
                        published = report.published.len(),
                        skipped = report.skipped.len(),
                        "Scheduled retrain finished"
                    ),
                    Ok(None) => {}
                    Err(e) => error!("Scheduled retrain failed: {e:#}"),
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Weight retrain scheduler started successfully");

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        }
    }

    /// Retrains once, now.
    ///
    /// # Errors
    /// Returns an error if reading error history or publishing fails.
    pub async fn run_once(&self) -> Result<Option<RetrainReport>> {
        self.adapter.retrain(Utc::now()).await
    }
}
