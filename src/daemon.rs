//! In-process cron triggers for long-running deployments.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::driver::{RunDriver, RunOutcome};
use crate::models::NotifyMode;
use crate::Result;

pub struct Daemon {
    driver: Arc<RunDriver>,
    mode: NotifyMode,
    config: SchedulerConfig,
    // Only one run at a time, whichever job fired it.
    run_lock: Arc<Mutex<()>>,
}

impl Daemon {
    pub fn new(driver: Arc<RunDriver>, mode: NotifyMode, config: SchedulerConfig) -> Self {
        Self {
            driver,
            mode,
            config,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cron_expression(&self) -> &str {
        match self.mode {
            NotifyMode::Instant => &self.config.instant_cron,
            NotifyMode::Daily => &self.config.daily_cron,
        }
    }

    /// Schedule the configured mode and block until Ctrl-C.
    pub async fn run_until_shutdown(&self) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        let driver = Arc::clone(&self.driver);
        let run_lock = Arc::clone(&self.run_lock);
        let mode = self.mode;
        let job = Job::new_async(self.cron_expression(), move |_uuid, _l| {
            let driver = Arc::clone(&driver);
            let run_lock = Arc::clone(&run_lock);
            Box::pin(async move {
                // Errors are already logged and recorded by the driver.
                let _ = run_serialized(&driver, &run_lock, mode).await;
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;
        tracing::info!(mode = %self.mode, cron = %self.cron_expression(), "Daemon started");

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down...");
        scheduler.shutdown().await?;
        Ok(())
    }

    /// Trigger one run now, waiting for any run in progress to finish first.
    pub async fn run_now(&self) -> Result<RunOutcome> {
        run_serialized(&self.driver, &self.run_lock, self.mode).await
    }
}

async fn run_serialized(driver: &RunDriver, run_lock: &Mutex<()>, mode: NotifyMode) -> Result<RunOutcome> {
    let _guard = run_lock.lock().await;
    driver.run(mode, Utc::now()).await
}
