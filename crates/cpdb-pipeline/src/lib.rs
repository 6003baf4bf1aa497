//! Profile processing pipeline: discovery, scraping and assessment of
//! candidate profiles with per-stage timeouts, retries, and an append-only
//! processing log.

pub mod collaborators;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod processor;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod url;

pub use collaborators::{
    CollaboratorError, Collaborators, DiscoveryQuery, ProfileAssessor, ProfileScraper,
    UrlDiscoverer,
};
pub use error::{PipelineError, StoreError};
pub use executor::{StageExecutor, StageTimeouts};
pub use outcome::{StageOutcome, StageOutput};
pub use processor::{PipelineSettings, ProfileProcessor};
pub use retry::{AttemptCount, RetryDecision, RetryPolicy};
pub use scheduler::{BatchOptions, BatchReport, BatchScheduler, BatchStatus, BatchSummary};
pub use store::{MemoryProfileStore, PgProfileStore, ProfileStore};
pub use url::{CanonicalUrl, UrlNormalizer, UrlRejection};
