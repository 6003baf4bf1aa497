use cpdb_core::ProfileStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile {0} not found")]
    NotFound(Uuid),
    #[error("profile {0} was saved by another writer since it was loaded")]
    Conflict(Uuid),
    #[error(transparent)]
    Db(cpdb_db::DbError),
}

impl From<cpdb_db::DbError> for StoreError {
    fn from(err: cpdb_db::DbError) -> Self {
        match err {
            cpdb_db::DbError::ProfileNotFound(id) => StoreError::NotFound(id),
            cpdb_db::DbError::Conflict(id) => StoreError::Conflict(id),
            other => StoreError::Db(other),
        }
    }
}

/// Internal errors that stop processing of one profile.
///
/// A profile ending in `Failed` is not an error; these cover the cases where
/// the pipeline itself could not do its job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("profile {0} not found")]
    ProfileNotFound(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Invariant(#[from] cpdb_core::CoreError),
    #[error("profile {profile_id} cannot move from {from} to {to}")]
    InvalidTransition {
        profile_id: Uuid,
        from: ProfileStatus,
        to: ProfileStatus,
    },
}
