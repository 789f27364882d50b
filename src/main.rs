use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use relist_watcher::catalog::FirecrawlSource;
use relist_watcher::config::NotificationChannel;
use relist_watcher::daemon::Daemon;
use relist_watcher::driver::record_failed_run;
use relist_watcher::lifecycle::LifecycleClassifier;
use relist_watcher::models::NotifyMode;
use relist_watcher::plugins::notifiers::{EmailNotifier, LogNotifier};
use relist_watcher::plugins::traits::Notifier;
use relist_watcher::scheduler::NotificationScheduler;
use relist_watcher::store::{HistoryStore, SqliteHistoryStore};
use relist_watcher::{AppConfig, RunDriver};

#[derive(Parser, Debug)]
#[command(
    name = "relist-watcher",
    about = "Track listings on a catalog page and notify about new and relisted ones"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single invocation (for cron or CI schedulers)
    Run {
        /// Delivery policy this invocation belongs to: instant or daily
        mode: NotifyMode,
        /// Log notifications instead of delivering them
        #[arg(long)]
        dry_run: bool,
    },
    /// Keep running and trigger the configured mode on its cron schedule
    Daemon {
        /// Log notifications instead of delivering them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the most recent run-log entries
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relist_watcher=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let store = Arc::new(
        SqliteHistoryStore::connect(&config.database)
            .await
            .with_context(|| format!("failed to open {}", config.database.url))?,
    );

    match cli.command {
        Command::Run { mode, dry_run } => {
            let driver = build_or_record(&config, &store, mode, dry_run).await?;
            let outcome = driver.run(mode, Utc::now()).await?;
            info!(?outcome, "Done");
        }
        Command::Daemon { dry_run } => {
            info!("Starting Relist Watcher...");
            let driver = build_or_record(&config, &store, config.notifications.mode, dry_run).await?;
            let daemon = Daemon::new(
                Arc::new(driver),
                config.notifications.mode,
                config.scheduler.clone(),
            );
            daemon.run_until_shutdown().await?;
        }
        Command::Runs { limit } => {
            for run in store.recent_runs(limit).await? {
                println!(
                    "{}  {:<8} {:<7} parsed={:<4} {}",
                    run.at.format("%Y-%m-%d %H:%M:%S"),
                    run.status.as_str(),
                    run.mode.as_str(),
                    run.parsed_count,
                    run.message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

/// Startup failures after the store is open still leave an `error` run-log
/// entry behind.
async fn build_or_record(
    config: &AppConfig,
    store: &Arc<SqliteHistoryStore>,
    mode: NotifyMode,
    dry_run: bool,
) -> Result<RunDriver> {
    match build_driver(config, store.clone(), dry_run) {
        Ok(driver) => Ok(driver),
        Err(err) => {
            record_failed_run(&**store, mode, &err, Utc::now()).await;
            Err(err.into())
        }
    }
}

fn build_driver(
    config: &AppConfig,
    store: Arc<SqliteHistoryStore>,
    dry_run: bool,
) -> relist_watcher::Result<RunDriver> {
    let source = FirecrawlSource::new(&config.catalog)?;

    let notifier: Arc<dyn Notifier> = if dry_run || config.notifications.channel == NotificationChannel::Log {
        Arc::new(LogNotifier::new())
    } else {
        Arc::new(EmailNotifier::new(&config.notifications.smtp)?)
    };
    info!(notifier = notifier.name(), "Notifier ready");

    let store: Arc<dyn HistoryStore> = store;
    Ok(RunDriver::new(
        store.clone(),
        Arc::new(source),
        notifier,
        LifecycleClassifier::new(store.clone(), config.lifecycle_policy()),
        NotificationScheduler::new(store, config.delivery_policy()?),
        config.notifications.recipient.clone(),
        config.catalog.max_items,
    ))
}
