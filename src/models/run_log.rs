use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, NotifyMode, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLogEntry {
    pub id: String,
    pub status: RunStatus,
    pub mode: NotifyMode,
    pub parsed_count: usize,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl RunLogEntry {
    pub fn new(status: RunStatus, mode: NotifyMode, parsed_count: usize, at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            status,
            mode,
            parsed_count,
            message: None,
            at,
        }
    }

    pub fn failed(mode: NotifyMode, error: impl ToString, at: DateTime<Utc>) -> Self {
        Self {
            message: Some(error.to_string()),
            ..Self::new(RunStatus::Error, mode, 0, at)
        }
    }
}
