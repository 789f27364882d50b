use async_trait::async_trait;
use metrics::counter;

use crate::plugins::traits::{Notification, Notifier};
use crate::Result;

/// Writes notifications to the tracing log instead of delivering them.
/// Used for dry runs and the `log` channel.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            label = %notification.mode_label,
            items = notification.items.len(),
            "Notification: {}",
            notification.subject
        );
        for item in &notification.items {
            tracing::info!(
                kind = item.kind.label(),
                category = %item.category,
                url = item.item_url.as_deref().unwrap_or("-"),
                "{} - {}",
                item.title,
                item.price_text
            );
        }
        counter!("notifications_sent_total").increment(1);
        Ok(())
    }
}
