//! The per-profile state machine.
//!
//! `Pending → Discovering → Scraping → Assessing → Completed`, with any
//! stage able to end in `Failed`. Each stage runs through the executor and
//! the retry policy until it succeeds or gives up; every transition is
//! persisted together with the log entry that caused it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cpdb_core::{FailureReason, ProcessingLogEntry, Profile, ProfileStatus, ReviewStatus, Stage};
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use uuid::Uuid;

use crate::collaborators::Collaborators;
use crate::error::{PipelineError, StoreError};
use crate::executor::{StageExecutor, StageTimeouts};
use crate::outcome::{StageOutcome, StageOutput};
use crate::retry::{AttemptCount, RetryDecision, RetryPolicy};
use crate::store::ProfileStore;
use crate::url::UrlNormalizer;

/// Tunables for a [`ProfileProcessor`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timeouts: StageTimeouts,
    pub retry: RetryPolicy,
    pub normalizer: UrlNormalizer,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &cpdb_core::AppConfig) -> Self {
        Self {
            timeouts: StageTimeouts::from_app_config(config),
            retry: RetryPolicy::from_app_config(config),
            normalizer: UrlNormalizer::new(config.profile_host.as_str()),
        }
    }
}

/// What happens after one stage attempt has been settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance,
    RetryAfter(std::time::Duration),
    GaveUp,
    /// Deadline reached before the next attempt; the profile stays in flight.
    Halted,
}

/// One async mutex per profile id, so a profile never has two stages
/// running at once within this process.
#[derive(Debug, Default)]
struct ProfileLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProfileLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct ProfileProcessor {
    store: Arc<dyn ProfileStore>,
    executor: StageExecutor,
    retry: RetryPolicy,
    normalizer: UrlNormalizer,
    locks: ProfileLocks,
}

impl ProfileProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProfileStore>,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        let executor = StageExecutor::new(
            Arc::clone(&store),
            collaborators,
            settings.normalizer.clone(),
            settings.timeouts,
        );
        Self {
            store,
            executor,
            retry: settings.retry,
            normalizer: settings.normalizer,
            locks: ProfileLocks::default(),
        }
    }

    /// Drives a profile to a terminal status.
    ///
    /// A profile that is already `Completed` or `Failed` is returned
    /// unchanged unless `force` is set, in which case its pipeline output is
    /// cleared and it restarts from `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the profile does not exist or the store
    /// fails. A profile ending in `Failed` is not an error.
    pub async fn advance(&self, id: Uuid, force: bool) -> Result<Profile, PipelineError> {
        self.advance_until(id, force, None).await
    }

    /// Like [`advance`](Self::advance), but starts no new stage attempt
    /// once `deadline` has passed. The returned profile may then still be
    /// in a non-terminal status; the next call resumes where it stopped.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub async fn advance_until(
        &self,
        id: Uuid,
        force: bool,
        deadline: Option<Instant>,
    ) -> Result<Profile, PipelineError> {
        let _guard = self.locks.acquire(id).await;

        let mut profile = self
            .store
            .load(id)
            .await?
            .ok_or(PipelineError::ProfileNotFound(id))?;

        if profile.status.is_terminal() {
            if !force {
                tracing::debug!(profile_id = %id, status = %profile.status, "profile already terminal");
                return Ok(profile);
            }
            profile.reset_for_reprocess();
            tracing::info!(profile_id = %id, run = profile.run, "forced reprocess");
            self.store.save(&mut profile, &[]).await?;
        }

        while let Some(stage) = profile.status.next_stage() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::info!(profile_id = %id, status = %profile.status, "deadline reached");
                break;
            }
            match self.run_stage(stage, &mut profile, deadline).await? {
                Step::Advance => {}
                Step::GaveUp | Step::Halted | Step::RetryAfter(_) => break,
            }
        }

        if profile.status == ProfileStatus::Completed {
            match self.store.refresh_rankings().await {
                Ok(()) => {
                    if let Some(ranked) = self.store.load(id).await? {
                        profile = ranked;
                    }
                }
                Err(err) => {
                    tracing::warn!(profile_id = %id, error = %err, "ranking refresh failed");
                }
            }
        }

        Ok(profile)
    }

    /// Current state of one profile.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ProfileNotFound`] or a store error.
    pub async fn profile(&self, id: Uuid) -> Result<Profile, PipelineError> {
        self.store
            .load(id)
            .await?
            .ok_or(PipelineError::ProfileNotFound(id))
    }

    /// Processing log of one profile in append order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ProfileNotFound`] or a store error.
    pub async fn logs(&self, id: Uuid) -> Result<Vec<ProcessingLogEntry>, PipelineError> {
        self.profile(id).await?;
        Ok(self.store.logs(id).await?)
    }

    /// Records a reviewer's verdict and notes. `None` leaves a field as is.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ProfileNotFound`] or a store error.
    pub async fn set_review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        notes: Option<String>,
    ) -> Result<Profile, PipelineError> {
        match self.store.set_review(id, status, notes).await {
            Ok(profile) => {
                tracing::info!(profile_id = %id, review_status = %profile.review_status, "review recorded");
                Ok(profile)
            }
            Err(StoreError::NotFound(_)) => Err(PipelineError::ProfileNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        profile: &mut Profile,
        deadline: Option<Instant>,
    ) -> Result<Step, PipelineError> {
        // A resumed stage keeps the budget and numbering of its earlier attempts.
        let history = self.store.logs(profile.id).await?;
        let mut count = AttemptCount::from_log(&history, profile.run, stage);
        let mut attempt = history
            .iter()
            .filter(|e| e.run == profile.run && e.stage == stage)
            .map(|e| e.attempt)
            .max()
            .unwrap_or(0);
        if attempt > 0 {
            tracing::info!(
                profile_id = %profile.id,
                %stage,
                spent = count.attempts,
                "resuming stage"
            );
        }

        loop {
            count.attempts += 1;
            attempt += 1;
            let mut step = Step::GaveUp;

            self.executor
                .execute(stage, attempt, profile, |profile, outcome| {
                    let outcome = self.check_discovered_url(stage, profile, outcome);
                    if matches!(outcome, StageOutcome::Timeout { .. }) {
                        count.timeouts += 1;
                    }
                    step = self.settle(stage, count, deadline, profile, &outcome);
                    outcome
                })
                .await?;

            match step {
                Step::RetryAfter(delay) => {
                    tracing::warn!(
                        profile_id = %profile.id,
                        %stage,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying stage after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return Ok(other),
            }
        }
    }

    /// Normalises a discovered URL; a rejected URL turns the success into a
    /// permanent failure. The raw URL is kept either way.
    fn check_discovered_url(
        &self,
        stage: Stage,
        profile: &mut Profile,
        outcome: StageOutcome,
    ) -> StageOutcome {
        let StageOutcome::Success(StageOutput::Url(raw)) = outcome else {
            return outcome;
        };
        debug_assert_eq!(stage, Stage::Discovery);

        profile.discovered_url = Some(raw.clone());
        match self.normalizer.normalize(&raw) {
            Ok(canonical) => {
                profile.canonical_url = Some(canonical.into_string());
                StageOutcome::Success(StageOutput::Url(raw))
            }
            Err(rejection) => {
                StageOutcome::permanent(format!("discovered URL rejected: {rejection}"))
            }
        }
    }

    /// Applies an attempt's outcome to the profile and picks the next step.
    fn settle(
        &self,
        stage: Stage,
        count: AttemptCount,
        deadline: Option<Instant>,
        profile: &mut Profile,
        outcome: &StageOutcome,
    ) -> Step {
        if let StageOutcome::Success(output) = outcome {
            match output {
                StageOutput::Url(_) => {}
                StageOutput::ProfileData(data) => profile.scraped_data = Some(data.clone()),
                StageOutput::Assessment(breakdown) => {
                    profile.final_score = Some(breakdown.overall_score);
                    profile.assessment = Some(breakdown.clone());
                }
            }
            profile.status = stage.success_status();
            return Step::Advance;
        }

        match self.retry.should_retry(stage, count, outcome) {
            RetryDecision::Retry(delay) if deadline.is_none_or(|d| Instant::now() + delay < d) => {
                Step::RetryAfter(delay)
            }
            RetryDecision::Retry(_) => Step::Halted,
            RetryDecision::GiveUp => {
                let kind = match outcome {
                    StageOutcome::Failure { kind, .. } => Some(*kind),
                    _ => None,
                };
                profile.status = ProfileStatus::Failed;
                profile.failure = Some(FailureReason {
                    stage,
                    kind,
                    detail: outcome.describe(),
                });
                tracing::warn!(
                    profile_id = %profile.id,
                    %stage,
                    attempts = count.attempts,
                    "stage gave up; profile failed"
                );
                Step::GaveUp
            }
        }
    }
}
