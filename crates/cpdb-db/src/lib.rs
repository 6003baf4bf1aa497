//! Postgres persistence for profiles and their processing log.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use uuid::Uuid;

pub mod processing_logs;
pub mod profiles;
pub mod seed;

pub use processing_logs::{list_processing_logs, ProcessingLogRow};
pub use profiles::{
    get_profile, insert_profile, list_profile_ids_by_status, list_profiles, list_rankings,
    refresh_rankings, save_transition, status_counts, update_review, ProfileRow, StatusCount,
};
pub use seed::{seed_profiles, SeedSummary};

// Resolved relative to crates/cpdb-db/Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &cpdb_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),
    #[error("profile {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] cpdb_core::CoreError),
    #[error("stored JSON could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Opens a Postgres pool sized by `config`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if no connection can be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Applies pending migrations and returns how many were new.
///
/// # Errors
///
/// Returns [`DbError::Migration`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let before = applied_migration_count(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migration_count(pool).await;
    Ok(usize::try_from(after.saturating_sub(before)).unwrap_or(0))
}

// The bookkeeping table does not exist before the first run.
async fn applied_migration_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Round-trips a trivial query to prove the pool is usable.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}
