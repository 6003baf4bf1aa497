//! Runs one attempt of one stage against one profile.
//!
//! Every attempt writes exactly one `started` entry before the collaborator
//! is called and exactly one terminal entry afterwards, whether the call
//! succeeded, failed, timed out, panicked, or returned something unusable.
//! The executor never retries.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cpdb_core::{LogOutcome, ProcessingLogEntry, Profile, ProfileStatus, Stage};
use futures::FutureExt;
use serde_json::json;

use crate::collaborators::{CollaboratorError, Collaborators, DiscoveryQuery};
use crate::error::PipelineError;
use crate::outcome::{StageOutcome, StageOutput};
use crate::store::ProfileStore;
use crate::url::UrlNormalizer;

/// Per-stage ceilings on a single collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub discovery: Duration,
    pub scraping: Duration,
    pub assessment: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            discovery: Duration::from_secs(30),
            scraping: Duration::from_secs(300),
            assessment: Duration::from_secs(60),
        }
    }
}

impl StageTimeouts {
    #[must_use]
    pub fn from_app_config(config: &cpdb_core::AppConfig) -> Self {
        Self {
            discovery: Duration::from_secs(config.discovery_timeout_secs),
            scraping: Duration::from_secs(config.scraping_timeout_secs),
            assessment: Duration::from_secs(config.assessment_timeout_secs),
        }
    }

    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Discovery => self.discovery,
            Stage::Scraping => self.scraping,
            Stage::Assessment => self.assessment,
        }
    }
}

pub struct StageExecutor {
    store: Arc<dyn ProfileStore>,
    collaborators: Collaborators,
    normalizer: UrlNormalizer,
    timeouts: StageTimeouts,
}

impl StageExecutor {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProfileStore>,
        collaborators: Collaborators,
        normalizer: UrlNormalizer,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            store,
            collaborators,
            normalizer,
            timeouts,
        }
    }

    /// Runs attempt `attempt` of `stage`.
    ///
    /// The profile is moved to the stage's in-flight status and saved with
    /// the `started` entry. Once the collaborator has answered, `settle`
    /// applies the outcome to the profile and may reclassify it; the result
    /// is saved together with the terminal entry and returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if either save fails, including when
    /// another writer saved the profile since it was loaded,
    /// [`PipelineError::Invariant`] if the profile would be persisted in an
    /// inconsistent state, or [`PipelineError::InvalidTransition`] if
    /// `settle` moves the status backwards.
    pub async fn execute<F>(
        &self,
        stage: Stage,
        attempt: u32,
        profile: &mut Profile,
        settle: F,
    ) -> Result<StageOutcome, PipelineError>
    where
        F: FnOnce(&mut Profile, StageOutcome) -> StageOutcome + Send,
    {
        let limit = self.timeouts.for_stage(stage);
        let in_flight = stage.in_flight_status();
        check_transition(profile, in_flight)?;
        profile.status = in_flight;
        profile.updated_at = Utc::now();

        let started = ProcessingLogEntry::new(
            profile.id,
            profile.run,
            stage,
            attempt,
            LogOutcome::Started,
            json!({ "timeout_secs": limit.as_secs() }),
        );
        profile.check_invariants()?;
        self.store.save(profile, &[started]).await?;
        tracing::info!(profile_id = %profile.id, %stage, attempt, "stage attempt started");

        let call = AssertUnwindSafe(self.invoke(stage, profile)).catch_unwind();
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => StageOutcome::permanent(format!(
                "collaborator panicked: {}",
                panic_message(panic.as_ref())
            )),
            Err(_) => StageOutcome::Timeout { limit },
        };

        let mut settled = profile.clone();
        let outcome = settle(&mut settled, outcome);
        check_transition(profile, settled.status)?;
        *profile = settled;
        profile.updated_at = Utc::now();
        profile.check_invariants()?;

        let finished = ProcessingLogEntry::new(
            profile.id,
            profile.run,
            stage,
            attempt,
            outcome.log_outcome(),
            outcome.log_detail(),
        );
        self.store.save(profile, &[finished]).await?;

        match &outcome {
            StageOutcome::Success(_) => tracing::info!(
                profile_id = %profile.id, %stage, attempt,
                outcome = %outcome.log_outcome(), status = %profile.status,
                "stage attempt finished"
            ),
            _ => tracing::warn!(
                profile_id = %profile.id, %stage, attempt,
                outcome = %outcome.log_outcome(), detail = %outcome.describe(),
                "stage attempt did not succeed"
            ),
        }

        Ok(outcome)
    }

    async fn invoke(&self, stage: Stage, profile: &Profile) -> StageOutcome {
        match stage {
            Stage::Discovery => self.discover(profile).await,
            Stage::Scraping => self.scrape(profile).await,
            Stage::Assessment => self.assess(profile).await,
        }
    }

    async fn discover(&self, profile: &Profile) -> StageOutcome {
        if let Some(supplied) = profile.supplied_url.as_deref() {
            if let Ok(canonical) = self.normalizer.normalize_supplied(supplied) {
                tracing::debug!(profile_id = %profile.id, "using supplied profile URL");
                return StageOutcome::Success(StageOutput::Url(canonical.into_string()));
            }
        }

        let query = DiscoveryQuery::from_profile(profile);
        match self.collaborators.discoverer.discover(&query).await {
            Ok(Some(url)) if !url.trim().is_empty() => {
                StageOutcome::Success(StageOutput::Url(url.trim().to_string()))
            }
            Ok(_) => StageOutcome::permanent("no profile URL found"),
            Err(err) => failure(err),
        }
    }

    async fn scrape(&self, profile: &Profile) -> StageOutcome {
        let Some(url) = profile.canonical_url.as_deref() else {
            return StageOutcome::permanent("no canonical URL to scrape");
        };

        match self.collaborators.scraper.scrape(url).await {
            Ok(serde_json::Value::Object(data)) if !data.is_empty() => {
                if profile_name(&data).is_none() {
                    return StageOutcome::permanent("scraped profile has no name");
                }
                StageOutcome::Success(StageOutput::ProfileData(serde_json::Value::Object(data)))
            }
            Ok(_) => StageOutcome::permanent("scraper returned an empty or non-object payload"),
            Err(err) => failure(err),
        }
    }

    async fn assess(&self, profile: &Profile) -> StageOutcome {
        let Some(data) = profile.scraped_data.as_ref() else {
            return StageOutcome::permanent("no scraped data to assess");
        };

        match self.collaborators.assessor.assess(data).await {
            Ok(breakdown) => match breakdown.validation_error() {
                Some(reason) => StageOutcome::permanent(format!("malformed assessment: {reason}")),
                None => StageOutcome::Success(StageOutput::Assessment(breakdown)),
            },
            Err(err) => failure(err),
        }
    }
}

/// Non-blank `basic_info.name` of scraped profile data.
fn profile_name(data: &serde_json::Map<String, serde_json::Value>) -> Option<&str> {
    data.get("basic_info")
        .and_then(|info| info.get("name"))
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn failure(err: CollaboratorError) -> StageOutcome {
    StageOutcome::Failure {
        kind: err.kind,
        detail: err.message,
    }
}

fn check_transition(profile: &Profile, next: ProfileStatus) -> Result<(), PipelineError> {
    if profile.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(PipelineError::InvalidTransition {
            profile_id: profile.id,
            from: profile.status,
            to: next,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
