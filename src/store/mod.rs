//! Persistence boundary for listing history.
//!
//! The classifier and scheduler only talk to [`HistoryStore`]; which backend
//! sits behind it is a deployment decision. Every failure surfaces as
//! [`AppError::StoreUnavailable`](crate::AppError::StoreUnavailable) and is
//! never retried here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use crate::models::{DigestLedgerEntry, ListingRecord, RecencyEntry, RecordUpdate, RunLogEntry};
use crate::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records whose `last_seen_at >= since`, for the disappearance sweep.
    async fn records_seen_since(&self, since: DateTime<Utc>) -> Result<Vec<RecencyEntry>>;

    async fn get_record(&self, fingerprint: &str) -> Result<Option<ListingRecord>>;

    async fn insert_record(&self, record: &ListingRecord) -> Result<()>;

    /// Apply a partial update. Never touches `first_seen_at`.
    async fn update_record(&self, fingerprint: &str, update: &RecordUpdate) -> Result<()>;

    async fn mark_disappeared(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<()>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    async fn append_run_log(&self, entry: &RunLogEntry) -> Result<()>;

    /// Most recent run-log entries, newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>>;

    /// Records with `start <= first_seen_at < end`.
    async fn records_first_seen_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>>;

    /// Records that came back in `[start, end)` after a disappearance that
    /// began before `disappeared_before`.
    ///
    /// Re-observation clears `disappeared_at`, so the disappearance being
    /// matched is the one kept in `previous_disappeared_at`; a record that is
    /// still absent matches on `disappeared_at` if it was last seen in range.
    async fn records_relisted_between(
        &self,
        disappeared_before: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>>;

    async fn has_digest_for_date(&self, date: NaiveDate) -> Result<bool>;

    /// Upserts the ledger row for `entry.digest_date`.
    async fn record_digest_sent(&self, entry: &DigestLedgerEntry) -> Result<()>;

    /// Batch lookup. Fingerprints without a record are simply absent from the map.
    async fn get_many(&self, fingerprints: &[String]) -> Result<HashMap<String, ListingRecord>> {
        let mut found = HashMap::with_capacity(fingerprints.len());
        for fingerprint in fingerprints {
            if let Some(record) = self.get_record(fingerprint).await? {
                found.insert(fingerprint.clone(), record);
            }
        }
        Ok(found)
    }

    /// Batch write: inserts unknown fingerprints, otherwise updates the mutable
    /// fields while keeping the stored `first_seen_at`.
    async fn upsert_many(&self, records: &[ListingRecord]) -> Result<()> {
        for record in records {
            if self.get_record(&record.fingerprint).await?.is_some() {
                let update = RecordUpdate::overwrite_with(record);
                self.update_record(&record.fingerprint, &update).await?;
            } else {
                self.insert_record(record).await?;
            }
        }
        Ok(())
    }
}
