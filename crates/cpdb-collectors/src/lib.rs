//! HTTP implementations of the discovery, scraping and assessment
//! collaborators.

pub mod assessment;
pub mod discovery;
pub mod error;
pub mod scraper;

use std::sync::Arc;
use std::time::Duration;

use cpdb_core::AppConfig;
use cpdb_pipeline::Collaborators;
use reqwest::{Client, Response, StatusCode, Url};

pub use assessment::ChatAssessor;
pub use discovery::SearchDiscoverer;
pub use error::CollectorError;
pub use scraper::SnapshotScraper;

/// Settings shared by every collector's HTTP client.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub user_agent: String,
    /// Ceiling for a single HTTP request. The stage timeout still bounds the
    /// whole collaborator call.
    pub request_timeout: Duration,
}

impl HttpOptions {
    #[must_use]
    pub fn new(user_agent: &str, request_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.to_owned(),
            request_timeout,
        }
    }
}

/// Builds all three HTTP collaborators from application config.
///
/// # Errors
///
/// Returns [`CollectorError::MissingApiKey`] when a collaborator's key is not
/// configured, or [`CollectorError::Http`] if a client cannot be built.
pub fn collaborators_from_config(config: &AppConfig) -> Result<Collaborators, CollectorError> {
    let discovery_key = config
        .discovery_api_key
        .as_deref()
        .ok_or(CollectorError::MissingApiKey("discovery"))?;
    let scraper_key = config
        .scraper_api_key
        .as_deref()
        .ok_or(CollectorError::MissingApiKey("scraper"))?;
    let assessment_key = config
        .assessment_api_key
        .as_deref()
        .ok_or(CollectorError::MissingApiKey("assessment"))?;

    let discoverer = SearchDiscoverer::new(
        discovery_key,
        &config.profile_host,
        config.discovery_max_results,
        &HttpOptions::new(
            &config.user_agent,
            Duration::from_secs(config.discovery_timeout_secs),
        ),
    )?;
    let scraper = SnapshotScraper::new(
        scraper_key,
        Duration::from_secs(config.scraper_poll_interval_secs),
        &HttpOptions::new(&config.user_agent, Duration::from_secs(30)),
    )?;
    let assessor = ChatAssessor::new(
        assessment_key,
        &config.assessment_model,
        &HttpOptions::new(
            &config.user_agent,
            Duration::from_secs(config.assessment_timeout_secs),
        ),
    )?;

    Ok(Collaborators {
        discoverer: Arc::new(discoverer),
        scraper: Arc::new(scraper),
        assessor: Arc::new(assessor),
    })
}

pub(crate) fn build_client(options: &HttpOptions) -> Result<Client, CollectorError> {
    let client = Client::builder()
        .timeout(options.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(options.user_agent.as_str())
        .build()?;
    Ok(client)
}

/// Parses a base URL, ensuring it ends with exactly one slash so that
/// `Url::join` appends to the path instead of replacing its last segment.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, CollectorError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| CollectorError::InvalidBaseUrl {
        url: base_url.to_owned(),
        reason: e.to_string(),
    })
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, CollectorError> {
    base.join(path).map_err(|e| CollectorError::InvalidBaseUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

/// Maps 429 and other non-2xx statuses onto [`CollectorError`].
pub(crate) fn check_status(
    response: Response,
    service: &'static str,
) -> Result<Response, CollectorError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CollectorError::RateLimited { service });
    }
    if !status.is_success() {
        return Err(CollectorError::UnexpectedStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Reads a response body as JSON, naming `context` on failure.
pub(crate) async fn read_json(
    response: Response,
    context: &str,
) -> Result<serde_json::Value, CollectorError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| CollectorError::Deserialize {
        context: context.to_owned(),
        source,
    })
}
