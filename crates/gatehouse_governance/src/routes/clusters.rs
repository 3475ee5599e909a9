//! Cluster registry endpoints: CRUD, validation, probing, diagnostics.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use gatehouse_protocol::defaults::DEFAULT_CLICKHOUSE_PORT;
use gatehouse_protocol::HealthState;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::Actor;
use super::{ApiError, AppState};
use crate::clickhouse::ClickHouseClient;
use crate::db::models::Cluster;
use crate::db::{ClusterUpdate, NewCluster};
use crate::validator::{self, ConnectionTestResult};

#[derive(Debug, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub default_database: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_CLICKHOUSE_PORT
}

fn default_protocol() -> String {
    "http".to_string()
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UpdateClusterRequest {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_database: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateConnectionRequest {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub default_database: Option<String>,
}

/// Cluster as exposed to operators. The ciphertext never leaves the store.
#[derive(Debug, Serialize)]
pub struct ClusterOut {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: String,
    pub username: String,
    pub default_database: Option<String>,
    pub created_by: i64,
    pub health_status: HealthState,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub server_version: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Cluster> for ClusterOut {
    fn from(c: Cluster) -> Self {
        Self {
            id: c.id,
            name: c.name,
            host: c.host,
            port: c.port,
            protocol: c.protocol,
            username: c.username,
            default_database: c.default_database,
            created_by: c.created_by,
            health_status: c.health_status,
            last_tested_at: c.last_tested_at,
            latency_ms: c.latency_ms,
            server_version: c.server_version,
            error_code: c.error_code,
            error_message: c.error_message,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClusterDiagnostics {
    #[serde(flatten)]
    pub cluster: ClusterOut,
    pub detected_current_user: Option<String>,
    pub dependency_count: i64,
}

pub async fn list_clusters(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<ClusterOut>>, ApiError> {
    let clusters = state.clusters.list().await?;
    Ok(Json(clusters.into_iter().map(ClusterOut::from).collect()))
}

pub async fn create_cluster(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateClusterRequest>,
) -> Result<(StatusCode, Json<ClusterOut>), ApiError> {
    actor.require_admin()?;
    let password_encrypted = state.secrets.encrypt(&request.password)?;
    let cluster = state
        .clusters
        .create(NewCluster {
            name: request.name,
            host: request.host,
            port: request.port as i64,
            protocol: request.protocol,
            username: request.username,
            password_encrypted,
            default_database: request.default_database,
            created_by: actor.user_id,
        })
        .await?;
    info!(cluster_id = cluster.id, actor = actor.user_id, "cluster_created");
    Ok((StatusCode::CREATED, Json(cluster.into())))
}

pub async fn update_cluster(
    State(state): State<AppState>,
    actor: Actor,
    Path(cluster_id): Path<i64>,
    Json(request): Json<UpdateClusterRequest>,
) -> Result<Json<ClusterOut>, ApiError> {
    actor.require_admin()?;
    let password_encrypted = match request.password.as_deref() {
        Some(password) => Some(state.secrets.encrypt(password)?),
        None => None,
    };
    let cluster = state
        .clusters
        .update(
            cluster_id,
            ClusterUpdate {
                name: request.name,
                host: request.host,
                port: request.port.map(|p| p as i64),
                protocol: request.protocol,
                username: request.username,
                password_encrypted,
                default_database: request.default_database.map(Some),
            },
        )
        .await?;
    info!(cluster_id, actor = actor.user_id, "cluster_updated");
    Ok(Json(cluster.into()))
}

pub async fn delete_cluster(
    State(state): State<AppState>,
    actor: Actor,
    Path(cluster_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    actor.require_admin()?;
    state.clusters.soft_delete(cluster_id).await?;
    info!(cluster_id, actor = actor.user_id, "cluster_deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Probe unsaved connection details. Nothing is persisted.
pub async fn validate_connection(
    State(_state): State<AppState>,
    actor: Actor,
    Json(request): Json<ValidateConnectionRequest>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    actor.require_admin()?;
    let client = ClickHouseClient::new(
        &request.host,
        request.port,
        &request.protocol,
        &request.username,
        request.password,
        request.default_database,
    );
    Ok(Json(validator::probe(&client).await))
}

/// Probe a registered cluster and persist the outcome on its row.
pub async fn test_cluster(
    State(state): State<AppState>,
    actor: Actor,
    Path(cluster_id): Path<i64>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    actor.require_admin()?;
    let cluster = state.clusters.get(cluster_id).await?;
    let client = ClickHouseClient::for_cluster(&cluster, &state.secrets)?;
    let result = validator::probe(&client).await;
    state.clusters.record_probe(cluster_id, &result).await?;
    Ok(Json(result))
}

// ── schema browsing (live queries, not snapshot-backed) ─────────────────

#[derive(Debug, Deserialize)]
pub struct TablesQuery {
    pub db: String,
}

#[derive(Debug, Deserialize)]
pub struct ColumnsQuery {
    pub db: String,
    pub table: String,
}

pub async fn list_databases(
    State(state): State<AppState>,
    _actor: Actor,
    Path(cluster_id): Path<i64>,
) -> Result<Json<Vec<String>>, ApiError> {
    let cluster = state.clusters.get(cluster_id).await?;
    let client = ClickHouseClient::for_cluster(&cluster, &state.secrets)?;
    Ok(Json(client.databases().await?))
}

pub async fn list_tables(
    State(state): State<AppState>,
    _actor: Actor,
    Path(cluster_id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<TablesQuery>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let cluster = state.clusters.get(cluster_id).await?;
    let client = ClickHouseClient::for_cluster(&cluster, &state.secrets)?;
    Ok(Json(client.tables(&query.db).await?))
}

pub async fn list_columns(
    State(state): State<AppState>,
    _actor: Actor,
    Path(cluster_id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<ColumnsQuery>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let cluster = state.clusters.get(cluster_id).await?;
    let client = ClickHouseClient::for_cluster(&cluster, &state.secrets)?;
    Ok(Json(client.columns(&query.db, &query.table).await?))
}

pub async fn cluster_diagnostics(
    State(state): State<AppState>,
    _actor: Actor,
    Path(cluster_id): Path<i64>,
) -> Result<Json<ClusterDiagnostics>, ApiError> {
    let cluster = state.clusters.get(cluster_id).await?;
    let dependency_count = state.clusters.dependency_count(cluster_id).await?;
    let detected_current_user = cluster.detected_current_user.clone();
    Ok(Json(ClusterDiagnostics {
        cluster: cluster.into(),
        detected_current_user,
        dependency_count,
    }))
}
