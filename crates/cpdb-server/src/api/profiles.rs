use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cpdb_core::{
    FailureReason, ProcessingLogEntry, Profile, ProfileStatus, ReviewStatus, ScoreBreakdown,
};
use cpdb_pipeline::{BatchOptions, BatchReport, BatchScheduler, BatchStatus, BatchSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

/// Upper bound on ids accepted by one batch request.
pub(super) const MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct ProfilesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProcessQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct BatchBody {
    pub ids: Vec<Uuid>,
    pub concurrency_limit: Option<usize>,
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub force: bool,
    /// Hold the response until the batch finishes instead of running it in
    /// the background.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct ReviewBody {
    pub review_status: Option<String>,
    pub review_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProfileItem {
    profile_id: Uuid,
    source_ref: Option<String>,
    name: String,
    company: Option<String>,
    status: ProfileStatus,
    discovered_url: Option<String>,
    canonical_url: Option<String>,
    has_scraped_data: bool,
    assessment: Option<ScoreBreakdown>,
    final_score: Option<f64>,
    ranking: Option<i32>,
    failure: Option<FailureReason>,
    run: u32,
    review_status: ReviewStatus,
    updated_at: DateTime<Utc>,
}

impl From<Profile> for ProfileItem {
    fn from(profile: Profile) -> Self {
        Self {
            profile_id: profile.id,
            source_ref: profile.source_ref,
            name: profile.name,
            company: profile.company,
            status: profile.status,
            discovered_url: profile.discovered_url,
            canonical_url: profile.canonical_url,
            has_scraped_data: profile.scraped_data.is_some(),
            assessment: profile.assessment,
            final_score: profile.final_score,
            ranking: profile.ranking,
            failure: profile.failure,
            run: profile.run,
            review_status: profile.review_status,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct LogItem {
    run: u32,
    stage: cpdb_core::Stage,
    attempt: u32,
    outcome: cpdb_core::LogOutcome,
    detail: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl From<ProcessingLogEntry> for LogItem {
    fn from(entry: ProcessingLogEntry) -> Self {
        Self {
            run: entry.run,
            stage: entry.stage,
            attempt: entry.attempt,
            outcome: entry.outcome,
            detail: entry.detail,
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ReviewItem {
    profile_id: Uuid,
    review_status: ReviewStatus,
    review_notes: Option<String>,
}

impl From<Profile> for ReviewItem {
    fn from(profile: Profile) -> Self {
        Self {
            profile_id: profile.id,
            review_status: profile.review_status,
            review_notes: profile.review_notes,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct BatchItem {
    profile_id: Uuid,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct BatchResult {
    results: Vec<BatchItem>,
    summary: BatchSummary,
}

impl From<BatchReport> for BatchResult {
    fn from(report: BatchReport) -> Self {
        let summary = report.summary();
        let results = report
            .results
            .into_iter()
            .map(|(profile_id, status)| {
                let label = status.label();
                let message = match status {
                    BatchStatus::Error(message) => Some(message),
                    _ => None,
                };
                BatchItem {
                    profile_id,
                    status: label,
                    message,
                }
            })
            .collect();
        Self { results, summary }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct BatchAccepted {
    accepted: usize,
}

pub(super) async fn list_profiles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProfilesQuery>,
) -> Result<Json<ApiResponse<Vec<ProfileItem>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ProfileStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let profiles = cpdb_db::list_profiles(&state.pool, status, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: profiles.into_iter().map(ProfileItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    let profile = state
        .processor
        .profile(id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: profile.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_logs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<LogItem>>>, ApiError> {
    let entries = state
        .processor
        .logs(id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: entries.into_iter().map(LogItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_review(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReviewItem>>, ApiError> {
    let profile = state
        .processor
        .profile(id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: profile.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Records a reviewer's verdict. Omitted fields keep their stored value.
pub(super) async fn update_review(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<ApiResponse<ReviewItem>>, ApiError> {
    let status = body
        .review_status
        .as_deref()
        .map(str::parse::<ReviewStatus>)
        .transpose()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let profile = state
        .processor
        .set_review(id, status, body.review_notes)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: profile.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

async fn advance(
    state: &AppState,
    req_id: RequestId,
    id: Uuid,
    force: bool,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    let profile = state
        .processor
        .advance(id, force)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    tracing::info!(profile_id = %id, status = %profile.status, force, "profile processed");

    Ok(Json(ApiResponse {
        data: profile.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Runs a profile to a terminal status and returns it. Terminal profiles
/// come back unchanged unless `?force=true`.
pub(super) async fn process_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Query(query): Query<ProcessQuery>,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    advance(&state, req_id, id, query.force).await
}

pub(super) async fn reprocess_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    advance(&state, req_id, id, true).await
}

pub(super) async fn run_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BatchBody>,
) -> Result<Response, ApiError> {
    if body.ids.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "ids must not be empty",
        ));
    }
    if body.ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("at most {MAX_BATCH_SIZE} ids per batch"),
        ));
    }

    let options = BatchOptions {
        concurrency_limit: body
            .concurrency_limit
            .unwrap_or(state.batch_defaults.concurrency_limit),
        deadline: body
            .deadline_secs
            .map(Duration::from_secs)
            .or(state.batch_defaults.deadline),
        force: body.force,
    };
    let scheduler = BatchScheduler::new(state.processor.clone());

    if body.wait {
        let report = scheduler.run_batch(&body.ids, options).await;
        let response = ApiResponse {
            data: BatchResult::from(report),
            meta: ResponseMeta::new(req_id.0),
        };
        return Ok((StatusCode::OK, Json(response)).into_response());
    }

    let accepted = body.ids.len();
    let ids = body.ids;
    let batch_request = req_id.0.clone();
    tokio::spawn(async move {
        let summary = scheduler.run_batch(&ids, options).await.summary();
        tracing::info!(
            request_id = %batch_request,
            completed = summary.completed,
            failed = summary.failed,
            incomplete = summary.incomplete,
            errors = summary.errors,
            "background batch finished"
        );
    });

    let response = ApiResponse {
        data: BatchAccepted { accepted },
        meta: ResponseMeta::new(req_id.0),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}
