//! The three-way result of one stage attempt.

use std::time::Duration;

use cpdb_core::{FailureKind, LogOutcome, ScoreBreakdown};
use serde_json::{json, Value};

/// Data a successful stage attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// Raw URL from discovery, before normalisation.
    Url(String),
    ProfileData(Value),
    Assessment(ScoreBreakdown),
}

impl StageOutput {
    /// Compact description written to the processing log.
    #[must_use]
    pub fn summary(&self) -> Value {
        match self {
            StageOutput::Url(url) => json!({ "url": url }),
            StageOutput::ProfileData(data) => {
                let sections: Vec<&String> = data
                    .as_object()
                    .map(|obj| obj.keys().collect())
                    .unwrap_or_default();
                json!({ "sections": sections })
            }
            StageOutput::Assessment(breakdown) => json!({
                "overall_score": breakdown.overall_score,
                "criteria": breakdown.criteria.len(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Success(StageOutput),
    Failure { kind: FailureKind, detail: String },
    Timeout { limit: Duration },
}

impl StageOutcome {
    pub fn permanent(detail: impl Into<String>) -> Self {
        StageOutcome::Failure {
            kind: FailureKind::Permanent,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    #[must_use]
    pub fn log_outcome(&self) -> LogOutcome {
        match self {
            StageOutcome::Success(_) => LogOutcome::Succeeded,
            StageOutcome::Failure { .. } => LogOutcome::Failed,
            StageOutcome::Timeout { .. } => LogOutcome::TimedOut,
        }
    }

    /// Log-entry detail for the terminal record of an attempt.
    #[must_use]
    pub fn log_detail(&self) -> Value {
        match self {
            StageOutcome::Success(output) => output.summary(),
            StageOutcome::Failure { kind, detail } => json!({
                "kind": kind.as_str(),
                "error": detail,
            }),
            StageOutcome::Timeout { limit } => json!({ "timeout_secs": limit.as_secs() }),
        }
    }

    /// Human-readable description used for failure reasons.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            StageOutcome::Success(_) => "succeeded".to_string(),
            StageOutcome::Failure { detail, .. } => detail.clone(),
            StageOutcome::Timeout { limit } => {
                format!("no response within {}s", limit.as_secs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_outcome_matches_variant() {
        assert_eq!(
            StageOutcome::Success(StageOutput::Url("u".into())).log_outcome(),
            LogOutcome::Succeeded
        );
        assert_eq!(StageOutcome::permanent("bad").log_outcome(), LogOutcome::Failed);
        assert_eq!(
            StageOutcome::Timeout {
                limit: Duration::from_secs(30)
            }
            .log_outcome(),
            LogOutcome::TimedOut
        );
    }

    #[test]
    fn failure_detail_records_kind_and_message() {
        let outcome = StageOutcome::Failure {
            kind: FailureKind::Transient,
            detail: "HTTP 503".to_string(),
        };
        assert_eq!(
            outcome.log_detail(),
            json!({"kind": "transient", "error": "HTTP 503"})
        );
    }

    #[test]
    fn profile_data_summary_lists_sections() {
        let output = StageOutput::ProfileData(json!({"basic_info": {}, "skills": []}));
        assert_eq!(
            output.summary(),
            json!({"sections": ["basic_info", "skills"]})
        );
    }

    #[test]
    fn timeout_describes_limit() {
        let outcome = StageOutcome::Timeout {
            limit: Duration::from_secs(30),
        };
        assert_eq!(outcome.describe(), "no response within 30s");
    }
}
