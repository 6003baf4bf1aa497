//! Candidate profile records and the vocabulary of the processing pipeline.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seeds::ProfileSeed;
use crate::CoreError;

/// One external-enrichment step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Scraping,
    Assessment,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Discovery, Stage::Scraping, Stage::Assessment];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Scraping => "scraping",
            Stage::Assessment => "assessment",
        }
    }

    /// The in-progress status a profile carries while this stage runs.
    #[must_use]
    pub fn in_flight_status(self) -> ProfileStatus {
        match self {
            Stage::Discovery => ProfileStatus::Discovering,
            Stage::Scraping => ProfileStatus::Scraping,
            Stage::Assessment => ProfileStatus::Assessing,
        }
    }

    /// The status a profile moves to once this stage succeeds.
    #[must_use]
    pub fn success_status(self) -> ProfileStatus {
        match self {
            Stage::Discovery => ProfileStatus::Scraping,
            Stage::Scraping => ProfileStatus::Assessing,
            Stage::Assessment => ProfileStatus::Completed,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" => Ok(Stage::Discovery),
            "scraping" => Ok(Stage::Scraping),
            "assessment" => Ok(Stage::Assessment),
            other => Err(CoreError::InvalidStage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Pending,
    Discovering,
    Scraping,
    Assessing,
    Completed,
    Failed,
}

impl ProfileStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileStatus::Pending => "pending",
            ProfileStatus::Discovering => "discovering",
            ProfileStatus::Scraping => "scraping",
            ProfileStatus::Assessing => "assessing",
            ProfileStatus::Completed => "completed",
            ProfileStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProfileStatus::Completed | ProfileStatus::Failed)
    }

    /// The stage that runs next for a profile in this status.
    ///
    /// `Pending` and `Discovering` both resume at discovery: a profile left in
    /// an in-flight status by an interrupted run re-executes that stage.
    /// Terminal statuses have no next stage.
    #[must_use]
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            ProfileStatus::Pending | ProfileStatus::Discovering => Some(Stage::Discovery),
            ProfileStatus::Scraping => Some(Stage::Scraping),
            ProfileStatus::Assessing => Some(Stage::Assessment),
            ProfileStatus::Completed | ProfileStatus::Failed => None,
        }
    }

    /// Position in the forward lifecycle; `Failed` ranks after everything.
    fn ordinal(self) -> u8 {
        match self {
            ProfileStatus::Pending => 0,
            ProfileStatus::Discovering => 1,
            ProfileStatus::Scraping => 2,
            ProfileStatus::Assessing => 3,
            ProfileStatus::Completed => 4,
            ProfileStatus::Failed => 5,
        }
    }

    /// Whether moving from `self` to `next` is allowed without a forced reset.
    ///
    /// Staying put is allowed (a retried attempt re-persists the in-flight
    /// status). Terminal statuses never move.
    #[must_use]
    pub fn can_transition_to(self, next: ProfileStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next == ProfileStatus::Failed || next.ordinal() >= self.ordinal()
    }
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProfileStatus::Pending),
            "discovering" => Ok(ProfileStatus::Discovering),
            "scraping" => Ok(ProfileStatus::Scraping),
            "assessing" => Ok(ProfileStatus::Assessing),
            "completed" => Ok(ProfileStatus::Completed),
            "failed" => Ok(ProfileStatus::Failed),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Failure taxonomy shared by every collaborator.
///
/// Timeouts are not a failure kind: the executor reports them as their own
/// outcome so the retry policy can cap them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Network errors, rate limits, 5xx responses. Worth retrying.
    Transient,
    /// Malformed input or payload, unsupported URL shape, collaborator
    /// rejection. Retrying returns the same answer.
    Permanent,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(FailureKind::Transient),
            "permanent" => Ok(FailureKind::Permanent),
            other => Err(CoreError::InvalidFailureKind(other.to_string())),
        }
    }
}

/// Why a profile ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    pub stage: Stage,
    /// `None` when the last attempt timed out.
    pub kind: Option<FailureKind>,
    pub detail: String,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{} failed ({kind}): {}", self.stage, self.detail),
            None => write!(f, "{} timed out: {}", self.stage, self.detail),
        }
    }
}

/// Structured result of the assessment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Final score on a 0–10 scale.
    pub overall_score: f64,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
    #[serde(default)]
    pub evidence: serde_json::Value,
    #[serde(default)]
    pub summary: Option<String>,
}

impl ScoreBreakdown {
    pub const MAX_SCORE: f64 = 10.0;

    /// Returns a description of the first problem that makes this breakdown
    /// unusable, or `None` if it is well formed.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        if !self.overall_score.is_finite() {
            return Some("overall_score is not a finite number".to_string());
        }
        if !(0.0..=Self::MAX_SCORE).contains(&self.overall_score) {
            return Some(format!(
                "overall_score {} is outside 0..={}",
                self.overall_score,
                Self::MAX_SCORE
            ));
        }
        self.criteria
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(k, _)| format!("criterion '{k}' is not a finite number"))
    }
}

/// A human reviewer's verdict on a candidate, kept apart from pipeline output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Unknown,
    Candidate,
    NotCandidate,
}

impl ReviewStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Unknown => "unknown",
            ReviewStatus::Candidate => "candidate",
            ReviewStatus::NotCandidate => "not_candidate",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(ReviewStatus::Unknown),
            "candidate" => Ok(ReviewStatus::Candidate),
            "not_candidate" => Ok(ReviewStatus::NotCandidate),
            other => Err(CoreError::InvalidReviewStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    /// Ingestion key from the upstream record; unique when present.
    pub source_ref: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub additional_info: Option<String>,
    /// Profile URL supplied at ingestion, tried before discovery runs.
    pub supplied_url: Option<String>,
    pub discovered_url: Option<String>,
    pub canonical_url: Option<String>,
    pub scraped_data: Option<serde_json::Value>,
    pub assessment: Option<ScoreBreakdown>,
    pub final_score: Option<f64>,
    pub ranking: Option<i32>,
    pub status: ProfileStatus,
    pub failure: Option<FailureReason>,
    /// Processing run, starting at 1. A forced reprocess starts the next run.
    pub run: u32,
    /// Bumped by the store on every pipeline save; a save from a stale copy
    /// is rejected.
    pub version: i64,
    pub review_status: ReviewStatus,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn from_seed(seed: &ProfileSeed) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_ref: seed.source_ref.clone(),
            name: seed.name.clone(),
            company: seed.company.clone(),
            email: seed.email.clone(),
            additional_info: seed.additional_info.clone(),
            supplied_url: seed.profile_url.clone(),
            discovered_url: None,
            canonical_url: None,
            scraped_data: None,
            assessment: None,
            final_score: None,
            ranking: None,
            status: ProfileStatus::Pending,
            failure: None,
            run: 1,
            version: 0,
            review_status: ReviewStatus::Unknown,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Clears all pipeline output, returns the profile to `Pending` and
    /// starts a new run.
    ///
    /// Input fields, the review verdict and `created_at` are kept.
    pub fn reset_for_reprocess(&mut self) {
        self.run += 1;
        self.discovered_url = None;
        self.canonical_url = None;
        self.scraped_data = None;
        self.assessment = None;
        self.final_score = None;
        self.ranking = None;
        self.failure = None;
        self.status = ProfileStatus::Pending;
        self.updated_at = Utc::now();
    }

    /// Checks the data-dependency invariants between pipeline outputs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] naming the first broken rule.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        let violation = |reason: &str| CoreError::InvariantViolation {
            profile_id: self.id,
            reason: reason.to_string(),
        };

        if self.scraped_data.is_some() && self.canonical_url.is_none() {
            return Err(violation("scraped data present without a canonical URL"));
        }
        if self.assessment.is_some() && self.scraped_data.is_none() {
            return Err(violation("assessment present without scraped data"));
        }
        if self.final_score.is_some() != self.assessment.is_some() {
            return Err(violation("final score and assessment must be set together"));
        }
        if self.failure.is_some() != (self.status == ProfileStatus::Failed) {
            return Err(violation("failure reason must be set exactly when status is failed"));
        }
        if self.status == ProfileStatus::Completed && self.assessment.is_none() {
            return Err(violation("completed profile has no assessment"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> ProfileSeed {
        ProfileSeed {
            source_ref: Some("evt-001".to_string()),
            name: "A. Liang".to_string(),
            company: Some("Example Labs".to_string()),
            email: Some("andy@example.com".to_string()),
            profile_url: None,
            additional_info: None,
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ProfileStatus::Pending,
            ProfileStatus::Discovering,
            ProfileStatus::Scraping,
            ProfileStatus::Assessing,
            ProfileStatus::Completed,
            ProfileStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ProfileStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(
            "processing".parse::<ProfileStatus>(),
            Err(CoreError::InvalidStatus("processing".to_string()))
        );
    }

    #[test]
    fn next_stage_follows_pipeline_order() {
        assert_eq!(ProfileStatus::Pending.next_stage(), Some(Stage::Discovery));
        assert_eq!(ProfileStatus::Discovering.next_stage(), Some(Stage::Discovery));
        assert_eq!(ProfileStatus::Scraping.next_stage(), Some(Stage::Scraping));
        assert_eq!(ProfileStatus::Assessing.next_stage(), Some(Stage::Assessment));
        assert_eq!(ProfileStatus::Completed.next_stage(), None);
        assert_eq!(ProfileStatus::Failed.next_stage(), None);
    }

    #[test]
    fn stage_success_feeds_next_stage() {
        assert_eq!(
            Stage::Discovery.success_status().next_stage(),
            Some(Stage::Scraping)
        );
        assert_eq!(
            Stage::Scraping.success_status().next_stage(),
            Some(Stage::Assessment)
        );
        assert_eq!(Stage::Assessment.success_status(), ProfileStatus::Completed);
    }

    #[test]
    fn transitions_never_move_backwards() {
        assert!(ProfileStatus::Pending.can_transition_to(ProfileStatus::Discovering));
        assert!(ProfileStatus::Discovering.can_transition_to(ProfileStatus::Scraping));
        assert!(ProfileStatus::Scraping.can_transition_to(ProfileStatus::Failed));
        assert!(!ProfileStatus::Assessing.can_transition_to(ProfileStatus::Scraping));
        assert!(!ProfileStatus::Scraping.can_transition_to(ProfileStatus::Pending));
    }

    #[test]
    fn terminal_statuses_are_frozen() {
        assert!(!ProfileStatus::Completed.can_transition_to(ProfileStatus::Pending));
        assert!(!ProfileStatus::Failed.can_transition_to(ProfileStatus::Discovering));
        assert!(!ProfileStatus::Completed.can_transition_to(ProfileStatus::Failed));
        assert!(ProfileStatus::Failed.can_transition_to(ProfileStatus::Failed));
    }

    #[test]
    fn new_profile_is_pending_and_consistent() {
        let profile = Profile::from_seed(&seed());
        assert_eq!(profile.status, ProfileStatus::Pending);
        assert!(profile.check_invariants().is_ok());
    }

    #[test]
    fn scraped_data_without_url_violates_invariant() {
        let mut profile = Profile::from_seed(&seed());
        profile.scraped_data = Some(serde_json::json!({"basic_info": {}}));
        assert!(matches!(
            profile.check_invariants(),
            Err(CoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn reset_clears_pipeline_output_but_keeps_inputs() {
        let mut profile = Profile::from_seed(&seed());
        profile.canonical_url = Some("https://profile-host.example/in/andyliang".to_string());
        profile.scraped_data = Some(serde_json::json!({"basic_info": {}}));
        profile.status = ProfileStatus::Failed;
        profile.failure = Some(FailureReason {
            stage: Stage::Assessment,
            kind: Some(FailureKind::Transient),
            detail: "rate limited".to_string(),
        });
        profile.review_status = ReviewStatus::Candidate;

        profile.reset_for_reprocess();

        assert_eq!(profile.status, ProfileStatus::Pending);
        assert_eq!(profile.run, 2);
        assert!(profile.canonical_url.is_none());
        assert!(profile.scraped_data.is_none());
        assert!(profile.failure.is_none());
        assert_eq!(profile.name, "A. Liang");
        assert_eq!(profile.review_status, ReviewStatus::Candidate);
        assert!(profile.check_invariants().is_ok());
    }

    #[test]
    fn review_status_uses_snake_case() {
        assert_eq!(
            "not_candidate".parse::<ReviewStatus>().unwrap(),
            ReviewStatus::NotCandidate
        );
        assert_eq!(
            serde_json::to_value(ReviewStatus::NotCandidate).unwrap(),
            serde_json::json!("not_candidate")
        );
        assert_eq!(
            "maybe".parse::<ReviewStatus>(),
            Err(CoreError::InvalidReviewStatus("maybe".to_string()))
        );
    }

    #[test]
    fn score_breakdown_rejects_out_of_range_score() {
        let breakdown = ScoreBreakdown {
            overall_score: 11.5,
            criteria: BTreeMap::new(),
            evidence: serde_json::Value::Null,
            summary: None,
        };
        assert!(breakdown.validation_error().is_some());
    }

    #[test]
    fn score_breakdown_accepts_valid_score() {
        let breakdown = ScoreBreakdown {
            overall_score: 6.5,
            criteria: BTreeMap::from([("seniority".to_string(), 7.0)]),
            evidence: serde_json::json!({}),
            summary: Some("strong".to_string()),
        };
        assert!(breakdown.validation_error().is_none());
    }

    #[test]
    fn failure_reason_display_names_stage() {
        let timed_out = FailureReason {
            stage: Stage::Discovery,
            kind: None,
            detail: "no response within 30s".to_string(),
        };
        assert_eq!(
            timed_out.to_string(),
            "discovery timed out: no response within 30s"
        );
    }
}
