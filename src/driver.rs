//! One invocation end to end: gate, fetch, classify, notify, log.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::Instrument;

use crate::catalog::SnapshotSource;
use crate::lifecycle::LifecycleClassifier;
use crate::models::{generate_id, NotifyMode, RunLogEntry, RunStatus, Snapshot};
use crate::plugins::traits::Notifier;
use crate::scheduler::{Admission, NotificationScheduler, SkipReason};
use crate::store::HistoryStore;
use crate::utils::error::AppError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Baseline { parsed: usize },
    Completed { parsed: usize, notified: usize },
}

pub struct RunDriver {
    store: Arc<dyn HistoryStore>,
    source: Arc<dyn SnapshotSource>,
    notifier: Arc<dyn Notifier>,
    classifier: LifecycleClassifier,
    scheduler: NotificationScheduler,
    recipient: String,
    max_items: usize,
}

impl RunDriver {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        source: Arc<dyn SnapshotSource>,
        notifier: Arc<dyn Notifier>,
        classifier: LifecycleClassifier,
        scheduler: NotificationScheduler,
        recipient: impl Into<String>,
        max_items: usize,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            classifier,
            scheduler,
            recipient: recipient.into(),
            max_items,
        }
    }

    /// Run one invocation. On failure an `error` run-log entry is written on a
    /// best-effort basis and the original error is returned.
    pub async fn run(&self, mode: NotifyMode, now: DateTime<Utc>) -> Result<RunOutcome> {
        let run_id = generate_id();
        let span = tracing::info_span!("run", mode = %mode, run_id = %run_id);

        async move {
            match self.execute(mode, now).await {
                Ok(outcome) => {
                    tracing::info!(?outcome, "Run finished");
                    Ok(outcome)
                }
                Err(err) => {
                    record_failed_run(self.store.as_ref(), mode, &err, now).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, mode: NotifyMode, now: DateTime<Utc>) -> Result<RunOutcome> {
        match self.scheduler.admit(mode, now).await? {
            Admission::Skip(reason) => {
                tracing::info!(%reason, "Skipping run");
                Ok(RunOutcome::Skipped(reason))
            }
            Admission::Baseline => self.baseline(mode, now).await,
            Admission::Classify => self.classify_and_notify(mode, now).await,
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let observations = self.source.fetch().await?;
        Ok(Snapshot::new(observations, self.max_items))
    }

    // The digest ledger is left alone: a daily run later in the same hour will
    // report the whole baseline as first seen today.
    async fn baseline(&self, mode: NotifyMode, now: DateTime<Utc>) -> Result<RunOutcome> {
        tracing::info!("Baseline not done; storing current catalog silently");
        let snapshot = self.fetch_snapshot().await?;

        self.classifier.classify(&snapshot, now, true).await?;
        self.classifier.complete_baseline().await?;
        self.store
            .append_run_log(&RunLogEntry::new(RunStatus::Baseline, mode, snapshot.len(), now))
            .await?;

        Ok(RunOutcome::Baseline {
            parsed: snapshot.len(),
        })
    }

    async fn classify_and_notify(&self, mode: NotifyMode, now: DateTime<Utc>) -> Result<RunOutcome> {
        let snapshot = self.fetch_snapshot().await?;
        let classification = self.classifier.classify(&snapshot, now, false).await?;
        self.store
            .append_run_log(&RunLogEntry::new(RunStatus::Ok, mode, snapshot.len(), now))
            .await?;

        let notified = match mode {
            NotifyMode::Instant => {
                let items = self.scheduler.instant_payload(&classification);
                if items.is_empty() {
                    tracing::info!("Instant: nothing new or relisted");
                    0
                } else {
                    let count = items.len();
                    let notification = self.scheduler.instant_notification(&self.recipient, items);
                    self.notifier.notify(&notification).await?;
                    count
                }
            }
            NotifyMode::Daily => {
                let window = self.scheduler.window(now)?;
                let items = self.scheduler.daily_payload(&window).await?;
                let count = items.len();
                if items.is_empty() {
                    tracing::info!(date = %window.date, "Daily: nothing today; marking digest as sent");
                } else {
                    let notification =
                        self.scheduler.daily_notification(&self.recipient, &window, items);
                    self.notifier.notify(&notification).await?;
                }
                self.classifier.record_digest_sent(window.date, count, now).await?;
                count
            }
        };

        Ok(RunOutcome::Completed {
            parsed: snapshot.len(),
            notified,
        })
    }
}

/// Log `err` and append an `error` run-log entry for it. Failures to write
/// the entry are only logged.
pub async fn record_failed_run(
    store: &dyn HistoryStore,
    mode: NotifyMode,
    err: &AppError,
    now: DateTime<Utc>,
) {
    tracing::error!(error = %err, "Run failed");
    let entry = RunLogEntry::failed(mode, err, now);
    if let Err(log_err) = store.append_run_log(&entry).await {
        tracing::warn!(error = %log_err, "Could not record failed run");
    }
}
