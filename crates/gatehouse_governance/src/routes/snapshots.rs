//! Snapshot collection, listing, and diff endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::auth::Actor;
use super::{ApiError, AppState};
use crate::clickhouse::ClickHouseClient;
use crate::collector;
use crate::db::models::SnapshotRun;
use crate::db::snapshots::RUN_COMPLETED;
use crate::diff::{compute_diff, SnapshotDiff};

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub cluster_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub cluster_id: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: i64,
    pub to: i64,
}

/// A run with its entity counts.
#[derive(Debug, Serialize)]
pub struct SnapshotRunOut {
    pub id: i64,
    pub cluster_id: i64,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_count: i64,
    pub role_count: i64,
    pub grant_count: i64,
}

#[derive(Debug, Serialize)]
pub struct SnapshotDiffOut {
    pub from_snapshot_id: i64,
    pub to_snapshot_id: i64,
    #[serde(flatten)]
    pub diff: SnapshotDiff,
}

async fn enrich(state: &AppState, run: SnapshotRun) -> Result<SnapshotRunOut, ApiError> {
    let counts = state.snapshots.counts(run.id).await?;
    Ok(SnapshotRunOut {
        id: run.id,
        cluster_id: run.cluster_id,
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        error: run.error,
        created_at: run.created_at,
        user_count: counts.users,
        role_count: counts.roles,
        grant_count: counts.grants,
    })
}

pub(crate) fn parse_payload(run: &SnapshotRun) -> Result<Map<String, Value>, ApiError> {
    match run.raw_payload.as_deref() {
        None => Ok(Map::new()),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        },
    }
}

pub async fn collect_snapshot(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CollectRequest>,
) -> Result<Json<SnapshotRunOut>, ApiError> {
    actor.require_admin()?;
    let cluster = state.clusters.get(request.cluster_id).await?;
    let client = ClickHouseClient::for_cluster(&cluster, &state.secrets)?;
    let run = collector::run_collection(cluster.id, &client, &state.snapshots).await?;
    Ok(Json(enrich(&state, run).await?))
}

pub async fn list_snapshots(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SnapshotRunOut>>, ApiError> {
    let limit = query.limit.clamp(1, 100);
    let runs = state.snapshots.list_runs(query.cluster_id, limit).await?;
    let mut out = Vec::with_capacity(runs.len());
    for run in runs {
        out.push(enrich(&state, run).await?);
    }
    Ok(Json(out))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    _actor: Actor,
    Path(snapshot_id): Path<i64>,
) -> Result<Json<SnapshotRunOut>, ApiError> {
    let run = state.snapshots.get_run(snapshot_id).await?;
    Ok(Json(enrich(&state, run).await?))
}

pub async fn diff_snapshots(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<DiffQuery>,
) -> Result<Json<SnapshotDiffOut>, ApiError> {
    let old_run = state.snapshots.get_run(query.from).await?;
    let new_run = state.snapshots.get_run(query.to).await?;
    if old_run.status != RUN_COMPLETED || new_run.status != RUN_COMPLETED {
        return Err(ApiError::BadRequest(
            "Both snapshots must be completed".to_string(),
        ));
    }

    let old_raw = parse_payload(&old_run)?;
    let new_raw = parse_payload(&new_run)?;
    Ok(Json(SnapshotDiffOut {
        from_snapshot_id: query.from,
        to_snapshot_id: query.to,
        diff: compute_diff(&old_raw, &new_raw),
    }))
}
