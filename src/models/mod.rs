use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::error::AppError;

pub mod digest;
pub mod listing;
pub mod run_log;
pub mod system_setting;

// Re-exports for convenience
pub use digest::*;
pub use listing::*;
pub use run_log::*;
pub use system_setting::*;

/// Delivery policy an invocation declares (and a deployment is configured for).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    Instant,
    Daily,
}

impl NotifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyMode::Instant => "instant",
            NotifyMode::Daily => "daily",
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotifyMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instant" => Ok(NotifyMode::Instant),
            "daily" => Ok(NotifyMode::Daily),
            other => Err(AppError::Configuration(format!(
                "unknown notification mode '{}' (expected 'instant' or 'daily')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Baseline,
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Baseline => "baseline",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

impl FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(RunStatus::Baseline),
            "ok" => Ok(RunStatus::Ok),
            "error" => Ok(RunStatus::Error),
            other => Err(AppError::Parse {
                message: format!("unknown run status '{}'", other),
            }),
        }
    }
}

/// Event tag attached to every notified listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemKind {
    New,
    Relisted,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::New => "NEW",
            ItemKind::Relisted => "RELISTED",
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
