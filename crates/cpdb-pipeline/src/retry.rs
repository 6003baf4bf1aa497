//! Retry decisions for failed stage attempts.
//!
//! One policy covers every stage. Permanent failures stop immediately,
//! transient failures retry until the attempt budget runs out, and timeouts
//! additionally count against their own smaller budget so a collaborator
//! that is consistently slow still gives up.

use std::time::Duration;

use cpdb_core::{FailureKind, LogOutcome, ProcessingLogEntry, Stage};

use crate::outcome::StageOutcome;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_TIMEOUT_ATTEMPTS: u32 = 2;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Attempt counters for one stage run, both 1-based and including the
/// attempt being judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptCount {
    pub attempts: u32,
    pub timeouts: u32,
}

impl AttemptCount {
    /// Budget already spent on `stage` during `run`: attempts that reached a
    /// terminal log entry, and how many of those timed out.
    #[must_use]
    pub fn from_log(entries: &[ProcessingLogEntry], run: u32, stage: Stage) -> Self {
        entries
            .iter()
            .filter(|e| e.run == run && e.stage == stage && e.outcome.is_terminal())
            .fold(Self::default(), |mut count, entry| {
                count.attempts += 1;
                if entry.outcome == LogOutcome::TimedOut {
                    count.timeouts += 1;
                }
                count
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: [u32; 3],
    max_timeout_attempts: u32,
    backoff_base: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_MAX_TIMEOUT_ATTEMPTS,
            DEFAULT_BACKOFF_BASE,
        )
    }
}

impl RetryPolicy {
    /// Zero limits are raised to one: every stage gets at least one attempt.
    #[must_use]
    pub fn new(max_attempts: u32, max_timeout_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: [max_attempts.max(1); 3],
            max_timeout_attempts: max_timeout_attempts.max(1),
            backoff_base,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    #[must_use]
    pub fn from_app_config(config: &cpdb_core::AppConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.max_timeout_attempts,
            Duration::from_millis(config.retry_backoff_base_ms),
        )
    }

    /// Overrides the attempt budget for one stage.
    #[must_use]
    pub fn with_stage_max_attempts(mut self, stage: Stage, max_attempts: u32) -> Self {
        self.max_attempts[stage_index(stage)] = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn max_attempts(&self, stage: Stage) -> u32 {
        self.max_attempts[stage_index(stage)]
    }

    #[must_use]
    pub fn max_timeout_attempts(&self) -> u32 {
        self.max_timeout_attempts
    }

    /// Decides what to do after `outcome` ended the attempt counted by `count`.
    ///
    /// A successful outcome never retries.
    #[must_use]
    pub fn should_retry(
        &self,
        stage: Stage,
        count: AttemptCount,
        outcome: &StageOutcome,
    ) -> RetryDecision {
        let retryable = match outcome {
            StageOutcome::Success(_)
            | StageOutcome::Failure {
                kind: FailureKind::Permanent,
                ..
            } => false,
            StageOutcome::Failure {
                kind: FailureKind::Transient,
                ..
            } => true,
            StageOutcome::Timeout { .. } => count.timeouts < self.max_timeout_attempts,
        };

        if !retryable || count.attempts >= self.max_attempts(stage) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay_for(count.attempts))
    }

    /// Delay before the attempt following `attempt`: `base * 2^(attempt-1)`,
    /// capped at the maximum delay. Never decreases as `attempt` grows.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

fn stage_index(stage: Stage) -> usize {
    match stage {
        Stage::Discovery => 0,
        Stage::Scraping => 1,
        Stage::Assessment => 2,
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
