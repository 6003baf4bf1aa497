//! Load/save contract between the pipeline and durable storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cpdb_core::{ProcessingLogEntry, Profile, ProfileStatus, ReviewStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Profile>, StoreError>;

    /// Persists `profile` and appends `entries` atomically: either both are
    /// stored or neither is.
    ///
    /// The write is a compare-and-set on `profile.version`: it fails with
    /// [`StoreError::Conflict`] if anyone saved the profile since this copy
    /// was loaded, and advances `profile.version` on success. Review fields
    /// and `ranking` are not written.
    async fn save(
        &self,
        profile: &mut Profile,
        entries: &[ProcessingLogEntry],
    ) -> Result<(), StoreError>;

    /// Updates the reviewer's verdict and notes; `None` keeps the stored
    /// value. Pipeline state and `version` are untouched.
    async fn set_review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        notes: Option<String>,
    ) -> Result<Profile, StoreError>;

    /// The profile's processing log in append order.
    async fn logs(&self, id: Uuid) -> Result<Vec<ProcessingLogEntry>, StoreError>;

    /// Recomputes rankings across all completed profiles.
    async fn refresh_rankings(&self) -> Result<(), StoreError>;
}

/// [`ProfileStore`] backed by the Postgres tables in `cpdb-db`.
#[derive(Debug, Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn load(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(cpdb_db::get_profile(&self.pool, id).await?)
    }

    async fn save(
        &self,
        profile: &mut Profile,
        entries: &[ProcessingLogEntry],
    ) -> Result<(), StoreError> {
        profile.version = cpdb_db::save_transition(&self.pool, profile, entries).await?;
        Ok(())
    }

    async fn set_review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        notes: Option<String>,
    ) -> Result<Profile, StoreError> {
        Ok(cpdb_db::update_review(&self.pool, id, status, notes.as_deref()).await?)
    }

    async fn logs(&self, id: Uuid) -> Result<Vec<ProcessingLogEntry>, StoreError> {
        Ok(cpdb_db::list_processing_logs(&self.pool, id).await?)
    }

    async fn refresh_rankings(&self) -> Result<(), StoreError> {
        let ranked = cpdb_db::refresh_rankings(&self.pool).await?;
        tracing::debug!(ranked, "rankings refreshed");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: HashMap<Uuid, Profile>,
    logs: Vec<ProcessingLogEntry>,
}

/// In-process [`ProfileStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    state: Mutex<MemoryState>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile without writing any log entries.
    pub fn insert(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id, profile);
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Profile> {
        self.lock().profiles.get(&id).cloned()
    }

    #[must_use]
    pub fn log_entries(&self, id: Uuid) -> Vec<ProcessingLogEntry> {
        self.lock()
            .logs
            .iter()
            .filter(|e| e.profile_id == id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn total_log_entries(&self) -> usize {
        self.lock().logs.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.get(id))
    }

    async fn save(
        &self,
        profile: &mut Profile,
        entries: &[ProcessingLogEntry],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let stored = state
            .profiles
            .get_mut(&profile.id)
            .ok_or(StoreError::NotFound(profile.id))?;
        if stored.version != profile.version {
            return Err(StoreError::Conflict(profile.id));
        }

        let ranking = if profile.status == ProfileStatus::Completed {
            stored.ranking
        } else {
            None
        };
        let version = profile.version + 1;
        *stored = Profile {
            ranking,
            version,
            review_status: stored.review_status,
            review_notes: stored.review_notes.take(),
            ..profile.clone()
        };
        profile.version = version;
        state.logs.extend_from_slice(entries);
        Ok(())
    }

    async fn set_review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        notes: Option<String>,
    ) -> Result<Profile, StoreError> {
        let mut state = self.lock();
        let stored = state.profiles.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(status) = status {
            stored.review_status = status;
        }
        if notes.is_some() {
            stored.review_notes = notes;
        }
        Ok(stored.clone())
    }

    async fn logs(&self, id: Uuid) -> Result<Vec<ProcessingLogEntry>, StoreError> {
        Ok(self.log_entries(id))
    }

    async fn refresh_rankings(&self) -> Result<(), StoreError> {
        let mut state = self.lock();

        let mut completed: Vec<(Uuid, f64, chrono::DateTime<chrono::Utc>)> = state
            .profiles
            .values()
            .filter(|p| p.status == ProfileStatus::Completed)
            .filter_map(|p| p.final_score.map(|score| (p.id, score, p.updated_at)))
            .collect();
        completed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

        let positions: HashMap<Uuid, i32> = completed
            .iter()
            .zip(1..)
            .map(|((id, _, _), position)| (*id, position))
            .collect();

        for profile in state.profiles.values_mut() {
            profile.ranking = positions.get(&profile.id).copied();
        }
        Ok(())
    }
}
