use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ItemKind, ListingRecord};
use crate::Result;

/// A classified listing as it appears in a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationItem {
    pub kind: ItemKind,
    pub fingerprint: String,
    pub title: String,
    pub price_text: String,
    pub category: String,
    pub image_url: Option<String>,
    pub item_url: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

impl NotificationItem {
    pub fn from_record(kind: ItemKind, record: &ListingRecord) -> Self {
        Self {
            kind,
            fingerprint: record.fingerprint.clone(),
            title: record.title.clone(),
            price_text: record.price_text.clone(),
            category: record.category.clone(),
            image_url: record.image_url.clone(),
            item_url: record.item_url.clone(),
            first_seen_at: record.first_seen_at,
        }
    }
}

/// One batched message for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub mode_label: String,
    pub items: Vec<NotificationItem>,
}

/// Delivery channel for notifications (email, log, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `notification`. Failures surface as
    /// [`AppError::NotificationDelivery`](crate::AppError::NotificationDelivery).
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
