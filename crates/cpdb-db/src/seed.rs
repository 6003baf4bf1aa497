use cpdb_core::{Profile, ProfileSeed};
use serde::Serialize;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Imports profile seeds in a single transaction.
///
/// A seed whose `source_ref` already exists updates that profile's input
/// fields only; status and pipeline output are left alone. Seeds without a
/// `source_ref` always create a new profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; nothing is committed.
pub async fn seed_profiles(pool: &PgPool, seeds: &[ProfileSeed]) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    for seed in seeds {
        let fresh = Profile::from_seed(seed);

        let inserted: bool = sqlx::query_scalar(
            "INSERT INTO profiles \
                 (id, source_ref, name, company, email, additional_info, supplied_url, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') \
             ON CONFLICT (source_ref) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 company = EXCLUDED.company, \
                 email = EXCLUDED.email, \
                 additional_info = EXCLUDED.additional_info, \
                 supplied_url = EXCLUDED.supplied_url, \
                 updated_at = NOW() \
             RETURNING (xmax = 0)",
        )
        .bind(fresh.id)
        .bind(fresh.source_ref.as_deref())
        .bind(&fresh.name)
        .bind(fresh.company.as_deref())
        .bind(fresh.email.as_deref())
        .bind(fresh.additional_info.as_deref())
        .bind(fresh.supplied_url.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        if inserted {
            summary.inserted += 1;
        } else {
            summary.updated += 1;
        }
    }

    tx.commit().await?;
    Ok(summary)
}
