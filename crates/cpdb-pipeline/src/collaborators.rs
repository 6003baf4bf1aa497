//! Contracts for the external services each stage calls.
//!
//! Implementations classify their own failures into [`FailureKind`]; the
//! executor never inspects message text.

use std::sync::Arc;

use async_trait::async_trait;
use cpdb_core::{FailureKind, Profile, ScoreBreakdown};
use thiserror::Error;

/// Error returned by any collaborator, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failure: {message}")]
pub struct CollaboratorError {
    pub kind: FailureKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

/// What discovery knows about a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub name: String,
    pub company: Option<String>,
    /// Domain part of the email address, used as an affiliation hint.
    pub email_domain: Option<String>,
    pub additional_info: Option<String>,
}

impl DiscoveryQuery {
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        let email_domain = profile
            .email
            .as_deref()
            .and_then(|email| email.rsplit_once('@'))
            .map(|(_, domain)| domain.trim().to_ascii_lowercase())
            .filter(|domain| !domain.is_empty());

        Self {
            name: profile.name.trim().to_string(),
            company: non_blank(profile.company.as_deref()),
            email_domain,
            additional_info: non_blank(profile.additional_info.as_deref()),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
pub trait UrlDiscoverer: Send + Sync {
    /// Returns a candidate profile URL, or `None` when nothing matched.
    async fn discover(&self, query: &DiscoveryQuery) -> Result<Option<String>, CollaboratorError>;
}

#[async_trait]
pub trait ProfileScraper: Send + Sync {
    /// Fetches structured profile data for a canonical profile URL.
    async fn scrape(&self, canonical_url: &str) -> Result<serde_json::Value, CollaboratorError>;
}

#[async_trait]
pub trait ProfileAssessor: Send + Sync {
    async fn assess(
        &self,
        profile_data: &serde_json::Value,
    ) -> Result<ScoreBreakdown, CollaboratorError>;
}

/// The three services a profile passes through, in stage order.
#[derive(Clone)]
pub struct Collaborators {
    pub discoverer: Arc<dyn UrlDiscoverer>,
    pub scraper: Arc<dyn ProfileScraper>,
    pub assessor: Arc<dyn ProfileAssessor>,
}
