use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use super::HistoryStore;
use crate::config::DatabaseConfig;
use crate::models::{
    DigestLedgerEntry, ListingRecord, NotifyMode, RecencyEntry, RecordUpdate, RunLogEntry,
    RunStatus,
};
use crate::utils::error::AppError;
use crate::Result;

const LISTING_COLUMNS: &str = "fingerprint, title, price_text, category, image_url, item_url, \
     first_seen_at, last_seen_at, disappeared_at, previous_disappeared_at, reappeared_at";

// SQLite's default host-parameter limit is 999.
const LOOKUP_CHUNK: usize = 500;

/// SQLite-backed history store.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database and apply pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.url.contains(":memory:") {
            // Each connection to an in-memory database is its own database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        } else {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = pool_options.connect_with(options).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Listing history migrations applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Parse {
            message: format!("timestamp out of range: {}", ms),
        })
}

fn optional_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<ListingRecord> {
    Ok(ListingRecord {
        fingerprint: row.try_get("fingerprint")?,
        title: row.try_get("title")?,
        price_text: row.try_get("price_text")?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        item_url: row.try_get("item_url")?,
        first_seen_at: from_millis(row.try_get("first_seen_at")?)?,
        last_seen_at: from_millis(row.try_get("last_seen_at")?)?,
        disappeared_at: optional_from_millis(row.try_get("disappeared_at")?)?,
        previous_disappeared_at: optional_from_millis(row.try_get("previous_disappeared_at")?)?,
        reappeared_at: optional_from_millis(row.try_get("reappeared_at")?)?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<RunLogEntry> {
    let status: String = row.try_get("status")?;
    let mode: String = row.try_get("mode")?;
    let parsed_count: i64 = row.try_get("parsed_count")?;

    Ok(RunLogEntry {
        id: row.try_get("id")?,
        status: RunStatus::from_str(&status)?,
        mode: NotifyMode::from_str(&mode)?,
        parsed_count: parsed_count.max(0) as usize,
        message: row.try_get("message")?,
        at: from_millis(row.try_get("at")?)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn records_seen_since(&self, since: DateTime<Utc>) -> Result<Vec<RecencyEntry>> {
        let rows = sqlx::query(
            "SELECT fingerprint, last_seen_at, disappeared_at FROM listings WHERE last_seen_at >= ?",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RecencyEntry> {
                Ok(RecencyEntry {
                    fingerprint: row.try_get("fingerprint")?,
                    last_seen_at: from_millis(row.try_get("last_seen_at")?)?,
                    disappeared_at: optional_from_millis(row.try_get("disappeared_at")?)?,
                })
            })
            .collect()
    }

    async fn get_record(&self, fingerprint: &str) -> Result<Option<ListingRecord>> {
        let sql = format!("SELECT {} FROM listings WHERE fingerprint = ?", LISTING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_record(&self, record: &ListingRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO listings ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            LISTING_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&record.fingerprint)
            .bind(&record.title)
            .bind(&record.price_text)
            .bind(&record.category)
            .bind(&record.image_url)
            .bind(&record.item_url)
            .bind(to_millis(record.first_seen_at))
            .bind(to_millis(record.last_seen_at))
            .bind(record.disappeared_at.map(to_millis))
            .bind(record.previous_disappeared_at.map(to_millis))
            .bind(record.reappeared_at.map(to_millis))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_record(&self, fingerprint: &str, update: &RecordUpdate) -> Result<()> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE listings SET ");
        let mut touched = false;
        {
            let mut set = qb.separated(", ");
            if let Some(title) = &update.title {
                set.push("title = ").push_bind_unseparated(title.clone());
                touched = true;
            }
            if let Some(price_text) = &update.price_text {
                set.push("price_text = ").push_bind_unseparated(price_text.clone());
                touched = true;
            }
            if let Some(category) = &update.category {
                set.push("category = ").push_bind_unseparated(category.clone());
                touched = true;
            }
            if let Some(image_url) = &update.image_url {
                set.push("image_url = ").push_bind_unseparated(image_url.clone());
                touched = true;
            }
            if let Some(item_url) = &update.item_url {
                set.push("item_url = ").push_bind_unseparated(item_url.clone());
                touched = true;
            }
            if let Some(last_seen_at) = update.last_seen_at {
                set.push("last_seen_at = ").push_bind_unseparated(to_millis(last_seen_at));
                touched = true;
            }
            if let Some(disappeared_at) = update.disappeared_at {
                set.push("disappeared_at = ")
                    .push_bind_unseparated(disappeared_at.map(to_millis));
                touched = true;
            }
            if let Some(previous) = update.previous_disappeared_at {
                set.push("previous_disappeared_at = ")
                    .push_bind_unseparated(previous.map(to_millis));
                touched = true;
            }
            if let Some(reappeared_at) = update.reappeared_at {
                set.push("reappeared_at = ")
                    .push_bind_unseparated(reappeared_at.map(to_millis));
                touched = true;
            }
        }

        if !touched {
            return Ok(());
        }

        qb.push(" WHERE fingerprint = ").push_bind(fingerprint.to_string());
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_disappeared(&self, fingerprint: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE listings SET disappeared_at = ? WHERE fingerprint = ?")
            .bind(to_millis(at))
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_run_log(&self, entry: &RunLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_log (id, status, mode, parsed_count, message, at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.status.as_str())
        .bind(entry.mode.as_str())
        .bind(entry.parsed_count as i64)
        .bind(&entry.message)
        .bind(to_millis(entry.at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, status, mode, parsed_count, message, at FROM run_log ORDER BY at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    async fn records_first_seen_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE first_seen_at >= ? AND first_seen_at < ? ORDER BY first_seen_at",
            LISTING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn records_relisted_between(
        &self,
        disappeared_before: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ListingRecord>> {
        let sql = format!(
            "SELECT {} FROM listings \
             WHERE (disappeared_at IS NOT NULL AND disappeared_at < ?1 \
                    AND last_seen_at >= ?2 AND last_seen_at < ?3) \
                OR (disappeared_at IS NULL AND previous_disappeared_at < ?1 \
                    AND reappeared_at >= ?2 AND reappeared_at < ?3) \
             ORDER BY last_seen_at",
            LISTING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(disappeared_before))
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn has_digest_for_date(&self, date: NaiveDate) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM digest_ledger WHERE digest_date = ?",
        )
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(found > 0)
    }

    async fn record_digest_sent(&self, entry: &DigestLedgerEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO digest_ledger (digest_date, item_count, sent_at) VALUES (?, ?, ?) \
             ON CONFLICT(digest_date) DO UPDATE SET item_count = excluded.item_count, sent_at = excluded.sent_at",
        )
        .bind(entry.digest_date.to_string())
        .bind(entry.item_count as i64)
        .bind(to_millis(entry.sent_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_many(&self, fingerprints: &[String]) -> Result<HashMap<String, ListingRecord>> {
        let mut found = HashMap::with_capacity(fingerprints.len());

        for chunk in fingerprints.chunks(LOOKUP_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM listings WHERE fingerprint IN (",
                LISTING_COLUMNS
            ));
            let mut list = qb.separated(", ");
            for fingerprint in chunk {
                list.push_bind(fingerprint.clone());
            }
            list.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let record = record_from_row(row)?;
                found.insert(record.fingerprint.clone(), record);
            }
        }

        Ok(found)
    }

    async fn upsert_many(&self, records: &[ListingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO listings ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(fingerprint) DO UPDATE SET \
                title = excluded.title, \
                price_text = excluded.price_text, \
                category = excluded.category, \
                image_url = excluded.image_url, \
                item_url = excluded.item_url, \
                last_seen_at = excluded.last_seen_at, \
                disappeared_at = excluded.disappeared_at, \
                previous_disappeared_at = excluded.previous_disappeared_at, \
                reappeared_at = excluded.reappeared_at",
            LISTING_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&sql)
                .bind(&record.fingerprint)
                .bind(&record.title)
                .bind(&record.price_text)
                .bind(&record.category)
                .bind(&record.image_url)
                .bind(&record.item_url)
                .bind(to_millis(record.first_seen_at))
                .bind(to_millis(record.last_seen_at))
                .bind(record.disappeared_at.map(to_millis))
                .bind(record.previous_disappeared_at.map(to_millis))
                .bind(record.reappeared_at.map(to_millis))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!("Upserted {} listing records", records.len());
        Ok(())
    }
}
