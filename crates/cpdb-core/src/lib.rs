//! Domain types and configuration shared by every `cpdb` crate.

pub mod app_config;
pub mod config;
pub mod processing_log;
pub mod profiles;
pub mod seeds;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use processing_log::{LogOutcome, ProcessingLogEntry};
pub use profiles::{
    FailureKind, FailureReason, Profile, ProfileStatus, ReviewStatus, ScoreBreakdown, Stage,
};
pub use seeds::{load_profile_seeds, parse_profile_seeds, ProfileSeed, ProfileSeedsFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read profiles file {path}: {source}")]
    ProfilesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profiles file: {0}")]
    ProfilesFileParse(#[from] serde_yaml::Error),

    #[error("profiles file validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid profile status: {0}")]
    InvalidStatus(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid log outcome: {0}")]
    InvalidOutcome(String),

    #[error("invalid failure kind: {0}")]
    InvalidFailureKind(String),

    #[error("invalid review status: {0}")]
    InvalidReviewStatus(String),

    #[error("profile {profile_id} violates invariant: {reason}")]
    InvariantViolation { profile_id: uuid::Uuid, reason: String },
}
