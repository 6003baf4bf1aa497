//! Bounded fan-out of profile processing across a batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cpdb_core::ProfileStatus;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::processor::ProfileProcessor;

/// Final state of one profile within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Failed,
    /// The batch deadline passed before the profile reached a terminal status.
    Incomplete,
    /// Processing stopped on an internal error (missing profile, store failure).
    Error(String),
}

impl BatchStatus {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Incomplete => "incomplete",
            BatchStatus::Error(_) => "error",
        }
    }

    fn from_profile_status(status: ProfileStatus) -> Self {
        match status {
            ProfileStatus::Completed => BatchStatus::Completed,
            ProfileStatus::Failed => BatchStatus::Failed,
            ProfileStatus::Pending
            | ProfileStatus::Discovering
            | ProfileStatus::Scraping
            | ProfileStatus::Assessing => BatchStatus::Incomplete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub concurrency_limit: usize,
    /// Wall-clock budget for the whole batch, measured from the call.
    pub deadline: Option<Duration>,
    /// Reprocess profiles that are already terminal.
    pub force: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 10,
            deadline: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub incomplete: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: BTreeMap<Uuid, BatchStatus>,
}

impl BatchReport {
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        self.results
            .values()
            .fold(BatchSummary::default(), |mut summary, status| {
                match status {
                    BatchStatus::Completed => summary.completed += 1,
                    BatchStatus::Failed => summary.failed += 1,
                    BatchStatus::Incomplete => summary.incomplete += 1,
                    BatchStatus::Error(_) => summary.errors += 1,
                }
                summary
            })
    }
}

pub struct BatchScheduler {
    processor: Arc<ProfileProcessor>,
}

impl BatchScheduler {
    #[must_use]
    pub fn new(processor: Arc<ProfileProcessor>) -> Self {
        Self { processor }
    }

    /// Advances every profile in `ids`, at most `concurrency_limit` at a time.
    ///
    /// Never fails as a whole: each id gets its own [`BatchStatus`].
    /// Duplicate ids are processed once. When a deadline is set the batch
    /// returns as soon as it passes, reporting every unfinished profile as
    /// [`BatchStatus::Incomplete`]. Attempts already running keep going in
    /// the background so their log entries are still written; no new
    /// attempt starts after the deadline.
    pub async fn run_batch(&self, ids: &[Uuid], options: BatchOptions) -> BatchReport {
        let mut seen = HashSet::new();
        let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let limit = options.concurrency_limit.max(1);
        let deadline = options.deadline.map(|budget| Instant::now() + budget);

        tracing::info!(
            profiles = unique.len(),
            concurrency_limit = limit,
            deadline_secs = options.deadline.map(|d| d.as_secs()),
            force = options.force,
            "batch started"
        );

        let force = options.force;
        let work = stream::iter(unique.clone())
            .map(|id| {
                let processor = Arc::clone(&self.processor);
                async move {
                    // Dropping the handle at the deadline detaches the task;
                    // the running attempt still finishes and logs.
                    let task = tokio::spawn(async move {
                        processor.advance_until(id, force, deadline).await
                    });
                    let status = match task.await {
                        Ok(Ok(profile)) => BatchStatus::from_profile_status(profile.status),
                        Ok(Err(err)) => {
                            tracing::error!(profile_id = %id, error = %err, "profile processing error");
                            BatchStatus::Error(err.to_string())
                        }
                        Err(err) => {
                            tracing::error!(profile_id = %id, error = %err, "profile task aborted");
                            BatchStatus::Error(format!("processing task aborted: {err}"))
                        }
                    };
                    (id, status)
                }
            })
            .buffer_unordered(limit);
        let mut work = std::pin::pin!(work);

        let mut results = BTreeMap::new();
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, work.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            finished = results.len(),
                            total = unique.len(),
                            "batch deadline reached"
                        );
                        break;
                    }
                },
                None => work.next().await,
            };
            let Some((id, status)) = next else { break };
            results.insert(id, status);
        }
        for id in &unique {
            results.entry(*id).or_insert(BatchStatus::Incomplete);
        }

        let report = BatchReport { results };
        let summary = report.summary();
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            incomplete = summary.incomplete,
            errors = summary.errors,
            "batch finished"
        );
        report
    }
}
