use chrono::Duration;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;
use validator::Validate;

use crate::lifecycle::LifecyclePolicy;
use crate::models::NotifyMode;
use crate::scheduler::DeliveryPolicy;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub catalog: CatalogConfig,
    #[validate(nested)]
    pub notifications: NotificationsConfig,
    #[validate(nested)]
    pub policy: PolicyConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogConfig {
    /// Short name used in notification subjects.
    #[validate(length(min = 1))]
    pub feed_name: String,
    /// Page the scrape API renders.
    pub url: String,
    /// Origin relative listing links are resolved against.
    pub base_url: String,
    pub api_base: String,
    pub api_key: Option<String>,
    #[validate(range(min = 1))]
    pub max_items: usize,
    #[validate(range(min = 1))]
    pub request_timeout: u64,
    #[validate(length(min = 1))]
    pub currency_marker: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotificationsConfig {
    pub mode: NotifyMode,
    pub channel: NotificationChannel,
    #[validate(email)]
    pub recipient: String,
    #[validate(nested)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SmtpConfig {
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub use_tls: bool,
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PolicyConfig {
    #[validate(range(min = 1))]
    pub recency_window_days: i64,
    #[validate(range(min = 0))]
    pub relist_threshold_hours: i64,
    #[validate(range(max = 23))]
    pub daily_hour: u32,
    pub time_zone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub instant_cron: String,
    pub daily_cron: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "WATCHER_"
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Field-level checks from the `validator` derives plus the cross-field
    /// rules below.
    pub fn validate_all(&self) -> Result<(), AppError> {
        Validate::validate(self)?;
        self.check()?;
        Ok(())
    }

    fn check(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.catalog.url).is_err() {
            return Err(ConfigError::Message("Invalid catalog.url".into()));
        }

        if Url::parse(&self.catalog.base_url).is_err() {
            return Err(ConfigError::Message("Invalid catalog.base_url".into()));
        }

        if Url::parse(&self.catalog.api_base).is_err() {
            return Err(ConfigError::Message("Invalid catalog.api_base".into()));
        }

        if self.time_zone().is_err() {
            return Err(ConfigError::Message(format!(
                "Unknown policy.time_zone '{}'",
                self.policy.time_zone
            )));
        }

        if self.notifications.channel == NotificationChannel::Email
            && self.notifications.smtp.host.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "notifications.smtp.host is required for the email channel".into(),
            ));
        }

        for (name, expr) in [
            ("scheduler.instant_cron", &self.scheduler.instant_cron),
            ("scheduler.daily_cron", &self.scheduler.daily_cron),
        ] {
            if !self.is_valid_cron(expr) {
                return Err(ConfigError::Message(format!("Invalid cron expression in {}", name)));
            }
        }

        Ok(())
    }

    fn is_valid_cron(&self, cron_expr: &str) -> bool {
        // tokio-cron-scheduler wants 6 fields (sec min hour day month weekday)
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if parts.len() != 6 {
            return false;
        }

        // Allow numbers, ranges, lists, and wildcards
        parts.iter().all(|part| {
            part.chars()
                .all(|c| c.is_ascii_digit() || c == '*' || c == '-' || c == ',' || c == '/')
        })
    }

    pub fn time_zone(&self) -> Result<Tz, AppError> {
        self.policy
            .time_zone
            .parse::<Tz>()
            .map_err(|e| AppError::Configuration(format!("invalid time zone: {}", e)))
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            recency_window: Duration::days(self.policy.recency_window_days),
            relist_threshold: Duration::hours(self.policy.relist_threshold_hours),
        }
    }

    pub fn delivery_policy(&self) -> Result<DeliveryPolicy, AppError> {
        Ok(DeliveryPolicy {
            configured_mode: self.notifications.mode,
            daily_hour: self.policy.daily_hour,
            time_zone: self.time_zone()?,
            feed_name: self.catalog.feed_name.clone(),
        })
    }
}
