use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row per local calendar day on which the daily digest went out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestLedgerEntry {
    pub digest_date: NaiveDate,
    pub item_count: usize,
    pub sent_at: DateTime<Utc>,
}
