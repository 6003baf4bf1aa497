//! Append-only audit records of stage attempts.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profiles::Stage;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Started,
    Succeeded,
    Failed,
    TimedOut,
}

impl LogOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogOutcome::Started => "started",
            LogOutcome::Succeeded => "succeeded",
            LogOutcome::Failed => "failed",
            LogOutcome::TimedOut => "timed_out",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, LogOutcome::Started)
    }
}

impl std::fmt::Display for LogOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(LogOutcome::Started),
            "succeeded" => Ok(LogOutcome::Succeeded),
            "failed" => Ok(LogOutcome::Failed),
            "timed_out" => Ok(LogOutcome::TimedOut),
            other => Err(CoreError::InvalidOutcome(other.to_string())),
        }
    }
}

/// One row of the processing log. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub profile_id: Uuid,
    /// Processing run of the profile when the entry was written.
    pub run: u32,
    pub stage: Stage,
    /// 1-based attempt number within the stage and run.
    pub attempt: u32,
    pub outcome: LogOutcome,
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl ProcessingLogEntry {
    #[must_use]
    pub fn new(
        profile_id: Uuid,
        run: u32,
        stage: Stage,
        attempt: u32,
        outcome: LogOutcome,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            profile_id,
            run,
            stage,
            attempt,
            outcome,
            detail,
            recorded_at: Utc::now(),
        }
    }
}
