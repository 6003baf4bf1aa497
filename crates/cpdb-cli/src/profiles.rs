//! Profile import, query and review handlers.

use std::path::Path;

use cpdb_core::{ProfileStatus, ReviewStatus, ScoreBreakdown};
use uuid::Uuid;

fn dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.1}"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Upserts the profiles listed in a YAML file, keyed by `source_ref`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or the write fails.
pub(crate) async fn run_import(pool: &sqlx::PgPool, path: &Path) -> anyhow::Result<()> {
    let file = cpdb_core::load_profile_seeds(path)?;
    let summary = cpdb_db::seed_profiles(pool, &file.profiles).await?;
    println!(
        "imported {} profile(s) from {}: {} new, {} updated",
        file.profiles.len(),
        path.display(),
        summary.inserted,
        summary.updated
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_list(
    pool: &sqlx::PgPool,
    status: Option<ProfileStatus>,
    limit: i64,
) -> anyhow::Result<()> {
    let profiles = cpdb_db::list_profiles(pool, status, limit).await?;
    if profiles.is_empty() {
        println!("no profiles found; run `profiles import <file>` first");
        return Ok(());
    }

    println!("{:<38}{:<13}{:<7}NAME", "ID", "STATUS", "SCORE");
    for profile in &profiles {
        println!(
            "{:<38}{:<13}{:<7}{}",
            profile.id.to_string(),
            profile.status.as_str(),
            fmt_score(profile.final_score),
            truncate(&profile.name, 40)
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the profile does not exist or the query fails.
pub(crate) async fn run_status(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<()> {
    let profile = cpdb_db::get_profile(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("profile {id} not found"))?;

    println!("Profile:    {} ({})", profile.name, profile.id);
    println!("Status:     {} (run {})", profile.status, profile.run);
    println!("Review:     {}", profile.review_status);
    println!("Discovered: {}", dash(profile.discovered_url.as_deref()));
    println!("Canonical:  {}", dash(profile.canonical_url.as_deref()));
    println!(
        "Scraped:    {}",
        if profile.scraped_data.is_some() { "yes" } else { "no" }
    );
    println!("Score:      {}", fmt_score(profile.final_score));
    println!(
        "Ranking:    {}",
        profile
            .ranking
            .map_or_else(|| "-".to_string(), |r| r.to_string())
    );
    if let Some(failure) = &profile.failure {
        println!("Failure:    {failure}");
    }
    if let Some(ScoreBreakdown {
        criteria, summary, ..
    }) = &profile.assessment
    {
        for (criterion, score) in criteria {
            println!("  {criterion:<24}{score:.1}");
        }
        if let Some(summary) = summary {
            println!("Summary:    {}", truncate(summary, 200));
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the profile does not exist or the query fails.
pub(crate) async fn run_logs(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<()> {
    if cpdb_db::get_profile(pool, id).await?.is_none() {
        anyhow::bail!("profile {id} not found");
    }
    let entries = cpdb_db::list_processing_logs(pool, id).await?;
    if entries.is_empty() {
        println!("no log entries for {id}; the profile has not been processed");
        return Ok(());
    }

    println!(
        "{:<22}{:<5}{:<12}{:<9}{:<11}DETAIL",
        "AT", "RUN", "STAGE", "ATTEMPT", "OUTCOME"
    );
    for entry in &entries {
        println!(
            "{:<22}{:<5}{:<12}{:<9}{:<11}{}",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.run,
            entry.stage.as_str(),
            entry.attempt,
            entry.outcome.as_str(),
            truncate(&entry.detail.to_string(), 80)
        );
    }
    Ok(())
}

/// Prints the review verdict, updating it first when a status or notes
/// are given.
///
/// # Errors
///
/// Returns an error if the profile does not exist or the query fails.
pub(crate) async fn run_review(
    pool: &sqlx::PgPool,
    id: Uuid,
    status: Option<ReviewStatus>,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let profile = if status.is_none() && notes.is_none() {
        cpdb_db::get_profile(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("profile {id} not found"))?
    } else {
        let profile = cpdb_db::update_review(pool, id, status, notes.as_deref()).await?;
        tracing::info!(profile_id = %id, review_status = %profile.review_status, "review recorded");
        profile
    };

    println!("Profile:    {} ({})", profile.name, profile.id);
    println!("Review:     {}", profile.review_status);
    println!("Notes:      {}", dash(profile.review_notes.as_deref()));
    Ok(())
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_rankings(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let ranked = cpdb_db::list_rankings(pool, limit).await?;
    if ranked.is_empty() {
        println!("no completed profiles yet");
        return Ok(());
    }

    println!("{:<6}{:<7}{:<40}URL", "RANK", "SCORE", "NAME");
    for profile in &ranked {
        println!(
            "{:<6}{:<7}{:<40}{}",
            profile.ranking.unwrap_or_default(),
            fmt_score(profile.final_score),
            truncate(&profile.name, 36),
            dash(profile.canonical_url.as_deref())
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_stats(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let counts = cpdb_db::status_counts(pool).await?;
    let total: i64 = counts.iter().map(|c| c.count).sum();
    for count in &counts {
        println!("{:<13}{}", count.status, count.count);
    }
    println!("{:<13}{total}", "total");
    Ok(())
}
