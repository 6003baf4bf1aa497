//! Append-only access to the `processing_logs` table.

use chrono::{DateTime, Utc};
use cpdb_core::ProcessingLogEntry;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessingLogRow {
    pub id: i64,
    pub profile_id: Uuid,
    pub run: i32,
    pub stage: String,
    pub attempt: i32,
    pub outcome: String,
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<ProcessingLogRow> for ProcessingLogEntry {
    type Error = DbError;

    fn try_from(row: ProcessingLogRow) -> Result<Self, Self::Error> {
        Ok(ProcessingLogEntry {
            profile_id: row.profile_id,
            run: u32::try_from(row.run).unwrap_or(1),
            stage: row.stage.parse()?,
            attempt: u32::try_from(row.attempt).unwrap_or_default(),
            outcome: row.outcome.parse()?,
            detail: row.detail,
            recorded_at: row.recorded_at,
        })
    }
}

/// Writes `entries` on an open connection, normally the caller's transaction.
pub(crate) async fn append_entries(
    conn: &mut PgConnection,
    entries: &[ProcessingLogEntry],
) -> Result<(), DbError> {
    for entry in entries {
        sqlx::query(
            "INSERT INTO processing_logs \
                 (profile_id, run, stage, attempt, outcome, detail, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.profile_id)
        .bind(i32::try_from(entry.run).unwrap_or(i32::MAX))
        .bind(entry.stage.as_str())
        .bind(i32::try_from(entry.attempt).unwrap_or(i32::MAX))
        .bind(entry.outcome.as_str())
        .bind(&entry.detail)
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Returns the full log of one profile in write order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure or [`DbError::Decode`] if a
/// stored stage or outcome is unknown.
pub async fn list_processing_logs(
    pool: &PgPool,
    profile_id: Uuid,
) -> Result<Vec<ProcessingLogEntry>, DbError> {
    let rows = sqlx::query_as::<_, ProcessingLogRow>(
        "SELECT id, profile_id, run, stage, attempt, outcome, detail, recorded_at \
         FROM processing_logs \
         WHERE profile_id = $1 \
         ORDER BY id",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProcessingLogEntry::try_from).collect()
}
