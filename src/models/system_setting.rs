use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
}

impl SystemSetting {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Whole-system lifecycle, persisted as a single settings row.
///
/// A deployment starts `Uninitialized`; the first successful run seeds history
/// silently and moves it to `Baselined` for good.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Baselined,
}

impl LifecycleState {
    pub const SETTING_KEY: &'static str = "lifecycle_state";

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Baselined => "baselined",
        }
    }

    /// Decode the persisted value; a missing row means nothing has run yet.
    pub fn from_setting(value: Option<&str>) -> Result<Self, AppError> {
        match value {
            None => Ok(LifecycleState::Uninitialized),
            Some(v) => v.parse(),
        }
    }

    pub fn to_setting(&self) -> SystemSetting {
        SystemSetting::new(Self::SETTING_KEY, self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(LifecycleState::Uninitialized),
            "baselined" => Ok(LifecycleState::Baselined),
            other => Err(AppError::Parse {
                message: format!("unknown lifecycle state '{}'", other),
            }),
        }
    }
}
