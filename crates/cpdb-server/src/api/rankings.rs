use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct RankingsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RankingItem {
    rank: i32,
    profile_id: Uuid,
    name: String,
    company: Option<String>,
    final_score: f64,
    canonical_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct StatsData {
    total: i64,
    by_status: Vec<cpdb_db::StatusCount>,
}

pub(super) async fn list_rankings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<Vec<RankingItem>>>, ApiError> {
    let ranked = cpdb_db::list_rankings(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    // Rows without a rank or score are mid-refresh; skip them.
    let data = ranked
        .into_iter()
        .filter_map(|profile| {
            Some(RankingItem {
                rank: profile.ranking?,
                profile_id: profile.id,
                name: profile.name,
                company: profile.company,
                final_score: profile.final_score?,
                canonical_url: profile.canonical_url,
            })
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn status_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<StatsData>>, ApiError> {
    let by_status = cpdb_db::status_counts(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: StatsData {
            total: by_status.iter().map(|c| c.count).sum(),
            by_status,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
