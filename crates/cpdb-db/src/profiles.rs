//! Database operations for the `profiles` table.

use chrono::{DateTime, Utc};
use cpdb_core::{
    FailureKind, FailureReason, ProcessingLogEntry, Profile, ProfileStatus, ReviewStatus,
    ScoreBreakdown,
};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::processing_logs::append_entries;
use crate::DbError;

const PROFILE_COLUMNS: &str = "id, source_ref, name, company, email, additional_info, \
     supplied_url, discovered_url, canonical_url, scraped_data, assessment, final_score, \
     ranking, status, failure_stage, failure_kind, failure_detail, run, version, \
     review_status, review_notes, created_at, updated_at";

/// A row from the `profiles` table, with enums and JSON still in storage form.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub source_ref: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub additional_info: Option<String>,
    pub supplied_url: Option<String>,
    pub discovered_url: Option<String>,
    pub canonical_url: Option<String>,
    pub scraped_data: Option<serde_json::Value>,
    pub assessment: Option<serde_json::Value>,
    pub final_score: Option<f64>,
    pub ranking: Option<i32>,
    pub status: String,
    pub failure_stage: Option<String>,
    pub failure_kind: Option<String>,
    pub failure_detail: Option<String>,
    pub run: i32,
    pub version: i64,
    pub review_status: String,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = DbError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let failure = match row.failure_stage {
            Some(stage) => Some(FailureReason {
                stage: stage.parse()?,
                kind: row.failure_kind.as_deref().map(str::parse).transpose()?,
                detail: row.failure_detail.unwrap_or_default(),
            }),
            None => None,
        };
        let assessment = row
            .assessment
            .map(serde_json::from_value::<ScoreBreakdown>)
            .transpose()?;

        Ok(Profile {
            id: row.id,
            source_ref: row.source_ref,
            name: row.name,
            company: row.company,
            email: row.email,
            additional_info: row.additional_info,
            supplied_url: row.supplied_url,
            discovered_url: row.discovered_url,
            canonical_url: row.canonical_url,
            scraped_data: row.scraped_data,
            assessment,
            final_score: row.final_score,
            ranking: row.ranking,
            status: row.status.parse()?,
            failure,
            run: u32::try_from(row.run).unwrap_or(1),
            version: row.version,
            review_status: row.review_status.parse()?,
            review_notes: row.review_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Profile count for one status value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Inserts a freshly ingested profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including on a duplicate
/// `source_ref`.
pub async fn insert_profile(pool: &PgPool, profile: &Profile) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO profiles \
             (id, source_ref, name, company, email, additional_info, supplied_url, \
              status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(profile.id)
    .bind(profile.source_ref.as_deref())
    .bind(&profile.name)
    .bind(profile.company.as_deref())
    .bind(profile.email.as_deref())
    .bind(profile.additional_info.as_deref())
    .bind(profile.supplied_url.as_deref())
    .bind(profile.status.as_str())
    .bind(profile.created_at)
    .bind(profile.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches one profile by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure or [`DbError::Decode`] if a
/// stored enum value is unknown.
pub async fn get_profile(pool: &PgPool, id: Uuid) -> Result<Option<Profile>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Profile::try_from).transpose()
}

/// Lists profiles newest first, optionally restricted to one status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure or [`DbError::Decode`] on a bad row.
pub async fn list_profiles(
    pool: &PgPool,
    status: Option<ProfileStatus>,
    limit: i64,
) -> Result<Vec<Profile>, DbError> {
    let rows = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at DESC, id \
         LIMIT $2"
    ))
    .bind(status.map(ProfileStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Profile::try_from).collect()
}

/// Returns ids of every profile whose status is one of `statuses`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profile_ids_by_status(
    pool: &PgPool,
    statuses: &[ProfileStatus],
) -> Result<Vec<Uuid>, DbError> {
    let wanted: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM profiles WHERE status = ANY($1) ORDER BY created_at, id",
    )
    .bind(&wanted)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Persists a profile's new state together with the log entries describing
/// the transition, in one transaction, and returns the new version.
///
/// The update only applies while the stored `version` still equals
/// `profile.version`, so two processes working from the same loaded copy
/// cannot both write. `ranking` is owned by [`refresh_rankings`] and the
/// review columns by [`update_review`]; this only clears `ranking` when the
/// profile leaves `completed`.
///
/// # Errors
///
/// Returns [`DbError::ProfileNotFound`] if no row has the profile's id,
/// [`DbError::Conflict`] if the row was saved since `profile` was loaded
/// (in both cases the transaction is rolled back and no log entries are
/// written), or [`DbError::Sqlx`] on any statement failure.
pub async fn save_transition(
    pool: &PgPool,
    profile: &Profile,
    entries: &[ProcessingLogEntry],
) -> Result<i64, DbError> {
    let assessment = profile
        .assessment
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;
    let failure = profile.failure.as_ref();

    let mut tx = pool.begin().await?;

    let version = sqlx::query_scalar::<_, i64>(
        "UPDATE profiles SET \
             discovered_url = $2, \
             canonical_url = $3, \
             scraped_data = $4, \
             assessment = $5, \
             final_score = $6, \
             status = $7, \
             ranking = CASE WHEN $7 = 'completed' THEN ranking ELSE NULL END, \
             failure_stage = $8, \
             failure_kind = $9, \
             failure_detail = $10, \
             updated_at = $11, \
             run = $12, \
             version = version + 1 \
         WHERE id = $1 AND version = $13 \
         RETURNING version",
    )
    .bind(profile.id)
    .bind(profile.discovered_url.as_deref())
    .bind(profile.canonical_url.as_deref())
    .bind(profile.scraped_data.as_ref())
    .bind(assessment)
    .bind(profile.final_score)
    .bind(profile.status.as_str())
    .bind(failure.map(|f| f.stage.as_str()))
    .bind(failure.and_then(|f| f.kind).map(FailureKind::as_str))
    .bind(failure.map(|f| f.detail.as_str()))
    .bind(profile.updated_at)
    .bind(i32::try_from(profile.run).unwrap_or(i32::MAX))
    .bind(profile.version)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(version) = version else {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM profiles WHERE id = $1)")
                .bind(profile.id)
                .fetch_one(&mut *tx)
                .await?;
        tx.rollback().await?;
        return Err(if exists {
            DbError::Conflict(profile.id)
        } else {
            DbError::ProfileNotFound(profile.id)
        });
    };

    append_entries(&mut tx, entries).await?;
    tx.commit().await?;

    Ok(version)
}

/// Sets a reviewer's verdict and notes; `None` keeps the stored value.
/// Pipeline columns and `version` are untouched.
///
/// # Errors
///
/// Returns [`DbError::ProfileNotFound`] if no row has the id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_review(
    pool: &PgPool,
    id: Uuid,
    status: Option<ReviewStatus>,
    notes: Option<&str>,
) -> Result<Profile, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "UPDATE profiles SET \
             review_status = COALESCE($2, review_status), \
             review_notes = COALESCE($3, review_notes) \
         WHERE id = $1 \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id)
    .bind(status.map(ReviewStatus::as_str))
    .bind(notes)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::ProfileNotFound(id))?.try_into()
}

/// Recomputes `ranking` over completed profiles: 1 is the highest
/// `final_score`, ties broken by earliest completion.
///
/// Returns the number of ranked profiles.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn refresh_rankings(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        "WITH ranked AS ( \
             SELECT id, \
                    ROW_NUMBER() OVER (ORDER BY final_score DESC, updated_at ASC, id) AS position \
             FROM profiles \
             WHERE status = 'completed' AND final_score IS NOT NULL \
         ) \
         UPDATE profiles p \
         SET ranking = ranked.position::int \
         FROM ranked \
         WHERE p.id = ranked.id AND p.ranking IS DISTINCT FROM ranked.position::int",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Lists completed profiles in ranking order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure or [`DbError::Decode`] on a bad row.
pub async fn list_rankings(pool: &PgPool, limit: i64) -> Result<Vec<Profile>, DbError> {
    let rows = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles \
         WHERE status = 'completed' AND ranking IS NOT NULL \
         ORDER BY ranking \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Profile::try_from).collect()
}

/// Counts profiles per status. Statuses with no profiles are omitted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn status_counts(pool: &PgPool) -> Result<Vec<StatusCount>, DbError> {
    let counts = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM profiles GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(counts)
}
