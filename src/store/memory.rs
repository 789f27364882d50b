use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::HistoryStore;
use crate::models::{DigestLedgerEntry, ListingRecord, RecencyEntry, RecordUpdate, RunLogEntry};
use crate::utils::error::AppError;
use crate::Result;

#[derive(Default)]
struct Tables {
    listings: HashMap<String, ListingRecord>,
    settings: HashMap<String, String>,
    run_log: Vec<RunLogEntry>,
    digest_ledger: HashMap<NaiveDate, DigestLedgerEntry>,
}

/// Process-local store. Used by tests and dry runs; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, sorted by fingerprint.
    pub async fn all_records(&self) -> Vec<ListingRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables.listings.values().cloned().collect();
        records.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        records
    }

    pub async fn digest_entries(&self) -> Vec<DigestLedgerEntry> {
        let tables = self.tables.read().await;
        let mut entries: Vec<_> = tables.digest_ledger.values().cloned().collect();
        entries.sort_by_key(|e| e.digest_date);
        entries
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn records_seen_since(&self, since: DateTime<Utc>) -> Result<Vec<RecencyEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .values()
            .filter(|r| r.last_seen_at >= since)
            .map(RecencyEntry::from)
            .collect())
    }

    async fn get_record(&self, fingerprint: &str) -> Result<Option<ListingRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.listings.get(fingerprint).cloned())
    }

    async fn insert_record(&self, record: &ListingRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.listings.contains_key(&record.fingerprint) {
            return Err(AppError::StoreUnavailable(format!(
                "duplicate fingerprint {}",
                record.fingerprint
            )));
        }
        tables.listings.insert(record.fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn update_record(&self, fingerprint: &str, update: &RecordUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(record) = tables.listings.get_mut(fingerprint) {
            record.apply(update.clone());
        }
        Ok(())
    }

    async fn mark_disappeared(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(record) = tables.listings.get_mut(fingerprint) {
            record.disappeared_at = Some(at);
        }
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn append_run_log(&self, entry: &RunLogEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.run_log.push(entry.clone());
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.run_log.iter().rev().take(limit).cloned().collect())
    }

    async fn records_first_seen_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .listings
            .values()
            .filter(|r| r.first_seen_at >= start && r.first_seen_at < end)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.first_seen_at);
        Ok(records)
    }

    async fn records_relisted_between(
        &self,
        disappeared_before: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .listings
            .values()
            .filter(|r| match (r.disappeared_at, r.reappeared_at) {
                (Some(gone), _) => {
                    gone < disappeared_before && r.last_seen_at >= start && r.last_seen_at < end
                }
                (None, Some(back)) => {
                    matches!(r.previous_disappeared_at, Some(gone) if gone < disappeared_before)
                        && back >= start
                        && back < end
                }
                (None, None) => false,
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.last_seen_at);
        Ok(records)
    }

    async fn has_digest_for_date(&self, date: NaiveDate) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.digest_ledger.contains_key(&date))
    }

    async fn record_digest_sent(&self, entry: &DigestLedgerEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.digest_ledger.insert(entry.digest_date, entry.clone());
        Ok(())
    }
}
