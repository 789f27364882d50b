use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::fingerprint::fingerprint;

/// A listing as seen in a single scrape. Never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingObservation {
    pub fingerprint: String,
    pub title: String,
    pub price_text: String,
    pub image_url: Option<String>,
    pub item_url: Option<String>,
    pub category: String,
}

impl ListingObservation {
    pub fn new(
        title: impl Into<String>,
        price_text: impl Into<String>,
        image_url: Option<String>,
        item_url: Option<String>,
        category: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let price_text = price_text.into();
        let fingerprint = fingerprint(&title, &price_text, image_url.as_deref());

        Self {
            fingerprint,
            title,
            price_text,
            image_url,
            item_url,
            category: category.into(),
        }
    }
}

/// All listings observed in one run, unique by fingerprint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    observations: Vec<ListingObservation>,
    fingerprints: HashSet<String>,
}

impl Snapshot {
    /// Build a snapshot keeping the first occurrence of each fingerprint and at
    /// most `max_items` observations.
    pub fn new(observations: Vec<ListingObservation>, max_items: usize) -> Self {
        let mut seen = HashSet::new();
        let observations: Vec<ListingObservation> = observations
            .into_iter()
            .filter(|obs| seen.insert(obs.fingerprint.clone()))
            .take(max_items)
            .collect();
        let fingerprints = observations.iter().map(|o| o.fingerprint.clone()).collect();

        Self {
            observations,
            fingerprints,
        }
    }

    pub fn observations(&self) -> &[ListingObservation] {
        &self.observations
    }

    pub fn fingerprints(&self) -> Vec<String> {
        self.observations.iter().map(|o| o.fingerprint.clone()).collect()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Persistent history of one listing identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub fingerprint: String,
    pub title: String,
    pub price_text: String,
    pub category: String,
    pub image_url: Option<String>,
    pub item_url: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub disappeared_at: Option<DateTime<Utc>>,
    /// The disappearance that the most recent reappearance ended.
    pub previous_disappeared_at: Option<DateTime<Utc>>,
    pub reappeared_at: Option<DateTime<Utc>>,
}

impl ListingRecord {
    /// A record for an identity observed for the first time at `now`.
    pub fn first_sighting(observation: &ListingObservation, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint: observation.fingerprint.clone(),
            title: observation.title.clone(),
            price_text: observation.price_text.clone(),
            category: observation.category.clone(),
            image_url: observation.image_url.clone(),
            item_url: observation.item_url.clone(),
            first_seen_at: now,
            last_seen_at: now,
            disappeared_at: None,
            previous_disappeared_at: None,
            reappeared_at: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.disappeared_at.is_none()
    }

    /// Apply a re-observation: refresh mutable fields, bump `last_seen_at` and
    /// clear any disappearance. `first_seen_at` is untouched.
    pub fn apply(&mut self, update: RecordUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(price_text) = update.price_text {
            self.price_text = price_text;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(image_url) = update.image_url {
            self.image_url = image_url;
        }
        if let Some(item_url) = update.item_url {
            self.item_url = item_url;
        }
        if let Some(last_seen_at) = update.last_seen_at {
            self.last_seen_at = last_seen_at;
        }
        if let Some(disappeared_at) = update.disappeared_at {
            self.disappeared_at = disappeared_at;
        }
        if let Some(previous) = update.previous_disappeared_at {
            self.previous_disappeared_at = previous;
        }
        if let Some(reappeared_at) = update.reappeared_at {
            self.reappeared_at = reappeared_at;
        }
    }
}

/// Partial update of a record's mutable fields.
///
/// Nullable columns use `Option<Option<_>>` so that "leave alone" (`None`) and
/// "set to null" (`Some(None)`) stay distinct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub price_text: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<Option<String>>,
    pub item_url: Option<Option<String>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub disappeared_at: Option<Option<DateTime<Utc>>>,
    pub previous_disappeared_at: Option<Option<DateTime<Utc>>>,
    pub reappeared_at: Option<Option<DateTime<Utc>>>,
}

impl RecordUpdate {
    /// The update produced by seeing `observation` again at `now`, given the
    /// record's current disappearance (if any).
    pub fn reobserved(
        observation: &ListingObservation,
        disappeared_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        // Only an actual absence moves the reappearance markers.
        let (previous_disappeared_at, reappeared_at) = match disappeared_at {
            Some(gone) => (Some(Some(gone)), Some(Some(now))),
            None => (None, None),
        };

        Self {
            title: Some(observation.title.clone()),
            price_text: Some(observation.price_text.clone()),
            category: Some(observation.category.clone()),
            image_url: Some(observation.image_url.clone()),
            item_url: Some(observation.item_url.clone()),
            last_seen_at: Some(now),
            disappeared_at: Some(None),
            previous_disappeared_at,
            reappeared_at,
        }
    }

    /// Full overwrite of every mutable column with `record`'s values.
    pub fn overwrite_with(record: &ListingRecord) -> Self {
        Self {
            title: Some(record.title.clone()),
            price_text: Some(record.price_text.clone()),
            category: Some(record.category.clone()),
            image_url: Some(record.image_url.clone()),
            item_url: Some(record.item_url.clone()),
            last_seen_at: Some(record.last_seen_at),
            disappeared_at: Some(record.disappeared_at),
            previous_disappeared_at: Some(record.previous_disappeared_at),
            reappeared_at: Some(record.reappeared_at),
        }
    }
}

/// Slim projection used by the disappearance sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RecencyEntry {
    pub fingerprint: String,
    pub last_seen_at: DateTime<Utc>,
    pub disappeared_at: Option<DateTime<Utc>>,
}

impl From<&ListingRecord> for RecencyEntry {
    fn from(record: &ListingRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.clone(),
            last_seen_at: record.last_seen_at,
            disappeared_at: record.disappeared_at,
        }
    }
}
