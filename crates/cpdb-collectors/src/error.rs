use cpdb_core::FailureKind;
use cpdb_pipeline::CollaboratorError;
use thiserror::Error;

/// Errors returned by the HTTP collaborator clients.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Network, TLS or request-timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {service}")]
    RateLimited { service: &'static str },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The service answered, but the answer is unusable.
    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl CollectorError {
    /// Classifies the error for the retry policy.
    ///
    /// Rate limits, 408, 5xx and connection or timeout failures are
    /// transient. Everything else (4xx, undecodable or unusable bodies,
    /// configuration problems) is permanent.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CollectorError::RateLimited { .. } => FailureKind::Transient,
            CollectorError::UnexpectedStatus { status, .. } => {
                if *status == 408 || *status == 429 || (500..600).contains(status) {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                }
            }
            CollectorError::Http(err) => {
                if err.is_decode() || err.is_builder() {
                    FailureKind::Permanent
                } else if let Some(status) = err.status() {
                    CollectorError::UnexpectedStatus {
                        status: status.as_u16(),
                        url: String::new(),
                    }
                    .failure_kind()
                } else {
                    FailureKind::Transient
                }
            }
            CollectorError::Deserialize { .. }
            | CollectorError::InvalidResponse { .. }
            | CollectorError::MissingApiKey(_)
            | CollectorError::InvalidBaseUrl { .. } => FailureKind::Permanent,
        }
    }
}

impl From<CollectorError> for CollaboratorError {
    fn from(err: CollectorError) -> Self {
        CollaboratorError {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}
