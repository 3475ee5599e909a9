//! Job endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use gatehouse_protocol::defaults::INTERNAL_KEY_HEADER;
use gatehouse_protocol::{CreateJobRequest, JobView};
use gatehouse_security::verify_internal_key;
use serde::Deserialize;

use super::{ApiError, AppState};

fn check_internal_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !verify_internal_key(&state.internal_api_key, presented) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// POST /jobs - admit and run a job. Idempotent on `correlation_id`.
pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> Result<Json<JobView>, ApiError> {
    check_internal_key(&state, &headers)?;
    let view = state.pipeline.run_job(request).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub proposal_id: Option<i64>,
}

/// GET /jobs?proposal_id=
pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    check_internal_key(&state, &headers)?;
    let views = state.pipeline.store().list_views(query.proposal_id).await?;
    Ok(Json(views))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
) -> Result<Json<JobView>, ApiError> {
    check_internal_key(&state, &headers)?;
    let view = state.pipeline.store().job_view(job_id).await?;
    Ok(Json(view))
}
