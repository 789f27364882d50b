//! Reconciles a snapshot against persisted listing history.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use metrics::counter;
use std::sync::Arc;

use crate::models::{
    DigestLedgerEntry, LifecycleState, ListingRecord, RecordUpdate, Snapshot,
};
use crate::store::HistoryStore;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// How far back the disappearance sweep looks.
    pub recency_window: Duration,
    /// Minimum absence before a reappearance counts as a relist.
    pub relist_threshold: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            recency_window: Duration::days(7),
            relist_threshold: Duration::hours(24),
        }
    }
}

/// Result of one reconciliation pass. Event lists are empty for silent runs;
/// the counters are always filled in.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub new_items: Vec<ListingRecord>,
    pub relisted_items: Vec<ListingRecord>,
    pub created: usize,
    pub refreshed: usize,
    pub disappeared: usize,
}

impl Classification {
    pub fn has_events(&self) -> bool {
        !self.new_items.is_empty() || !self.relisted_items.is_empty()
    }
}

pub struct LifecycleClassifier {
    store: Arc<dyn HistoryStore>,
    policy: LifecyclePolicy,
}

impl LifecycleClassifier {
    pub fn new(store: Arc<dyn HistoryStore>, policy: LifecyclePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn classify(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        silent: bool,
    ) -> Result<Classification> {
        let mut classification = Classification {
            disappeared: self.sweep_disappeared(snapshot, now).await?,
            ..Default::default()
        };

        let known = self.store.get_many(&snapshot.fingerprints()).await?;
        let mut writes = Vec::with_capacity(snapshot.len());

        for observation in snapshot.observations() {
            match known.get(&observation.fingerprint) {
                None => {
                    let record = ListingRecord::first_sighting(observation, now);
                    classification.created += 1;
                    if !silent {
                        classification.new_items.push(record.clone());
                    }
                    writes.push(record);
                }
                Some(existing) => {
                    let is_relisted = existing
                        .disappeared_at
                        .is_some_and(|gone| now - gone >= self.policy.relist_threshold);

                    let mut record = existing.clone();
                    record.apply(RecordUpdate::reobserved(observation, existing.disappeared_at, now));
                    classification.refreshed += 1;
                    if is_relisted && !silent {
                        classification.relisted_items.push(record.clone());
                    }
                    writes.push(record);
                }
            }
        }

        self.store.upsert_many(&writes).await?;

        counter!("listings_new_total").increment(classification.new_items.len() as u64);
        counter!("listings_relisted_total").increment(classification.relisted_items.len() as u64);
        counter!("listings_disappeared_total").increment(classification.disappeared as u64);

        tracing::info!(
            parsed = snapshot.len(),
            created = classification.created,
            refreshed = classification.refreshed,
            disappeared = classification.disappeared,
            new = classification.new_items.len(),
            relisted = classification.relisted_items.len(),
            silent,
            "Snapshot classified"
        );

        Ok(classification)
    }

    /// Marks recently seen, still-present records that are missing from the
    /// snapshot as disappeared at `now`.
    async fn sweep_disappeared(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<usize> {
        let since = now - self.policy.recency_window;
        let recent = self.store.records_seen_since(since).await?;

        let mut marked = 0;
        for entry in recent {
            if entry.disappeared_at.is_none() && !snapshot.contains(&entry.fingerprint) {
                self.store.mark_disappeared(&entry.fingerprint, now).await?;
                tracing::debug!(fingerprint = %entry.fingerprint, "Listing disappeared");
                marked += 1;
            }
        }
        Ok(marked)
    }

    pub async fn lifecycle_state(&self) -> Result<LifecycleState> {
        let value = self.store.get_setting(LifecycleState::SETTING_KEY).await?;
        LifecycleState::from_setting(value.as_deref())
    }

    pub async fn complete_baseline(&self) -> Result<()> {
        let setting = LifecycleState::Baselined.to_setting();
        self.store.set_setting(&setting.key, &setting.value).await?;
        tracing::info!("Baseline completed; future runs will notify");
        Ok(())
    }

    pub async fn record_digest_sent(
        &self,
        date: NaiveDate,
        item_count: usize,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = DigestLedgerEntry {
            digest_date: date,
            item_count,
            sent_at: at,
        };
        self.store.record_digest_sent(&entry).await
    }
}
