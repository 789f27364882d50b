//! Temporal gating and payload selection for notifications.
//!
//! Everything time-zone related lives here. [`DeliveryPolicy::gate`] and
//! [`is_eligible_now`] are pure; [`NotificationScheduler`] adds the store
//! lookups (digest ledger, lifecycle state, daily window queries).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::lifecycle::Classification;
use crate::models::{ItemKind, LifecycleState, ListingRecord, NotifyMode};
use crate::plugins::traits::{Notification, NotificationItem};
use crate::store::HistoryStore;
use crate::utils::error::AppError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ModeMismatch {
        requested: NotifyMode,
        configured: NotifyMode,
    },
    OutsideDailyHour {
        local_time: String,
        daily_hour: u32,
    },
    DigestAlreadySent(NaiveDate),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ModeMismatch { requested, configured } => {
                write!(f, "invoked as {} but configured for {}", requested, configured)
            }
            SkipReason::OutsideDailyHour { local_time, daily_hour } => {
                write!(f, "daily digest runs at {:02}:00, local time is {}", daily_hour, local_time)
            }
            SkipReason::DigestAlreadySent(date) => {
                write!(f, "digest already sent for {}", date)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPolicy {
    pub configured_mode: NotifyMode,
    /// Local hour (0..=23) at which the daily digest may go out.
    pub daily_hour: u32,
    pub time_zone: Tz,
    /// Short feed name used in subjects.
    pub feed_name: String,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            configured_mode: NotifyMode::Instant,
            daily_hour: 9,
            time_zone: chrono_tz::Europe::Bucharest,
            feed_name: "Listings".to_string(),
        }
    }
}

impl DeliveryPolicy {
    /// Mode match first, then the daily hour gate.
    pub fn gate(&self, mode: NotifyMode, now: DateTime<Utc>) -> std::result::Result<(), SkipReason> {
        if mode != self.configured_mode {
            return Err(SkipReason::ModeMismatch {
                requested: mode,
                configured: self.configured_mode,
            });
        }

        if mode == NotifyMode::Daily {
            let local = now.with_timezone(&self.time_zone);
            if local.hour() != self.daily_hour {
                return Err(SkipReason::OutsideDailyHour {
                    local_time: local.format("%H:%M").to_string(),
                    daily_hour: self.daily_hour,
                });
            }
        }

        Ok(())
    }
}

pub fn is_eligible_now(mode: NotifyMode, now: DateTime<Utc>, policy: &DeliveryPolicy) -> bool {
    policy.gate(mode, now).is_ok()
}

/// One local calendar day expressed as a half-open UTC range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DigestWindow {
    pub fn containing(now: DateTime<Utc>, tz: Tz) -> Result<Self> {
        let date = now.with_timezone(&tz).date_naive();
        let next = date
            .succ_opt()
            .ok_or_else(|| AppError::Internal(format!("no day after {}", date)))?;

        Ok(Self {
            date,
            start: start_of_day(date, tz)?,
            end: start_of_day(next, tz)?,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

fn start_of_day(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>> {
    let midnight: NaiveDateTime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::Internal(format!("invalid midnight for {}", date)))?;

    // Some zones skip midnight on DST changes; the day then starts at the
    // first local time that exists.
    (0..=2)
        .filter_map(|h| tz.from_local_datetime(&(midnight + Duration::hours(h))).earliest())
        .next()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AppError::Internal(format!("cannot resolve start of {} in {}", date, tz)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Skip(SkipReason),
    /// First run ever: seed history silently, notify nothing.
    Baseline,
    Classify,
}

pub struct NotificationScheduler {
    store: Arc<dyn HistoryStore>,
    policy: DeliveryPolicy,
}

impl NotificationScheduler {
    pub fn new(store: Arc<dyn HistoryStore>, policy: DeliveryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn window(&self, now: DateTime<Utc>) -> Result<DigestWindow> {
        DigestWindow::containing(now, self.policy.time_zone)
    }

    /// Decide what this invocation does. Nothing is fetched or written here.
    pub async fn admit(&self, mode: NotifyMode, now: DateTime<Utc>) -> Result<Admission> {
        if let Err(reason) = self.policy.gate(mode, now) {
            return Ok(Admission::Skip(reason));
        }

        if mode == NotifyMode::Daily {
            let window = self.window(now)?;
            if self.store.has_digest_for_date(window.date).await? {
                return Ok(Admission::Skip(SkipReason::DigestAlreadySent(window.date)));
            }
        }

        let value = self.store.get_setting(LifecycleState::SETTING_KEY).await?;
        match LifecycleState::from_setting(value.as_deref())? {
            LifecycleState::Uninitialized => Ok(Admission::Baseline),
            LifecycleState::Baselined => Ok(Admission::Classify),
        }
    }

    /// NEW items first, then RELISTED, as classified in this run.
    pub fn instant_payload(&self, classification: &Classification) -> Vec<NotificationItem> {
        classification
            .new_items
            .iter()
            .map(|r| NotificationItem::from_record(ItemKind::New, r))
            .chain(
                classification
                    .relisted_items
                    .iter()
                    .map(|r| NotificationItem::from_record(ItemKind::Relisted, r)),
            )
            .collect()
    }

    /// Everything first seen in the window plus everything that came back in
    /// it after an absence starting before the window. No relist debounce is
    /// applied here.
    pub async fn daily_payload(&self, window: &DigestWindow) -> Result<Vec<NotificationItem>> {
        let first_seen = self
            .store
            .records_first_seen_between(window.start, window.end)
            .await?;
        let relisted = self
            .store
            .records_relisted_between(window.start, window.start, window.end)
            .await?;

        Ok(merge_daily(first_seen, relisted))
    }

    pub fn instant_notification(&self, recipient: &str, items: Vec<NotificationItem>) -> Notification {
        Notification {
            recipient: recipient.to_string(),
            subject: format!(
                "[{}] {} new/relisted listings",
                self.policy.feed_name,
                items.len()
            ),
            mode_label: "Instant".to_string(),
            items,
        }
    }

    pub fn daily_notification(
        &self,
        recipient: &str,
        window: &DigestWindow,
        items: Vec<NotificationItem>,
    ) -> Notification {
        let date = window.date.format("%Y-%m-%d");
        Notification {
            recipient: recipient.to_string(),
            subject: format!(
                "[{}] Today's list ({}) - {} listings",
                self.policy.feed_name,
                date,
                items.len()
            ),
            mode_label: format!(
                "Daily {:02}:00 ({}) • {}",
                self.policy.daily_hour,
                self.policy.time_zone.name(),
                date
            ),
            items,
        }
    }
}

fn merge_daily(first_seen: Vec<ListingRecord>, relisted: Vec<ListingRecord>) -> Vec<NotificationItem> {
    let mut seen = HashSet::new();
    first_seen
        .iter()
        .map(|r| (ItemKind::New, r))
        .chain(relisted.iter().map(|r| (ItemKind::Relisted, r)))
        .filter(|(_, r)| seen.insert(r.fingerprint.clone()))
        .map(|(kind, r)| NotificationItem::from_record(kind, r))
        .collect()
}
