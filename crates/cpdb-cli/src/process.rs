//! `process` and `batch` handlers: run the pipeline against Postgres with
//! the HTTP collaborators.

use std::sync::Arc;
use std::time::Duration;

use cpdb_core::{AppConfig, ProfileStatus};
use cpdb_pipeline::{
    BatchOptions, BatchScheduler, BatchStatus, PgProfileStore, PipelineSettings, ProfileProcessor,
};
use uuid::Uuid;

/// Arguments of the `batch` command.
#[derive(Debug)]
pub(crate) struct BatchRequest {
    pub ids: Vec<Uuid>,
    pub pending: bool,
    pub concurrency: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub force: bool,
}

fn build_processor(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<Arc<ProfileProcessor>> {
    let collaborators = cpdb_collectors::collaborators_from_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build collaborators: {e}"))?;
    let store = Arc::new(PgProfileStore::new(pool.clone()));
    Ok(Arc::new(ProfileProcessor::new(
        store,
        collaborators,
        PipelineSettings::from_app_config(config),
    )))
}

/// # Errors
///
/// Returns an error if collaborators cannot be configured, the profile does
/// not exist, or the store fails. A profile ending in `failed` is reported,
/// not returned as an error.
pub(crate) async fn run_process(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    id: Uuid,
    force: bool,
) -> anyhow::Result<()> {
    let processor = build_processor(pool, config)?;
    let profile = processor.advance(id, force).await?;

    match (&profile.status, &profile.failure) {
        (ProfileStatus::Failed, Some(failure)) => println!("{id}: failed; {failure}"),
        (ProfileStatus::Completed, _) => println!(
            "{id}: completed; score {:.1}, rank {}",
            profile.final_score.unwrap_or_default(),
            profile
                .ranking
                .map_or_else(|| "-".to_string(), |r| r.to_string())
        ),
        (status, _) => println!("{id}: {status}"),
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if neither ids nor `--pending` select anything to run,
/// or if collaborators cannot be configured. Per-profile failures are part
/// of the printed report.
pub(crate) async fn run_batch(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    request: BatchRequest,
) -> anyhow::Result<()> {
    let ids = if request.pending {
        cpdb_db::list_profile_ids_by_status(
            pool,
            &[
                ProfileStatus::Pending,
                ProfileStatus::Discovering,
                ProfileStatus::Scraping,
                ProfileStatus::Assessing,
            ],
        )
        .await?
    } else {
        request.ids
    };
    if ids.is_empty() {
        if request.pending {
            println!("no unfinished profiles to process");
            return Ok(());
        }
        anyhow::bail!("pass --ids <ID>... or --pending");
    }

    let options = BatchOptions {
        concurrency_limit: request
            .concurrency
            .unwrap_or(config.max_concurrent_profiles),
        deadline: request
            .deadline_secs
            .or(config.batch_deadline_secs)
            .map(Duration::from_secs),
        force: request.force,
    };

    let processor = build_processor(pool, config)?;
    let report = BatchScheduler::new(processor).run_batch(&ids, options).await;

    for (id, status) in &report.results {
        match status {
            BatchStatus::Error(message) => println!("{id}  error: {message}"),
            other => println!("{id}  {}", other.label()),
        }
    }
    let summary = report.summary();
    println!(
        "batch finished: {} completed, {} failed, {} incomplete, {} errors",
        summary.completed, summary.failed, summary.incomplete, summary.errors
    );
    Ok(())
}
