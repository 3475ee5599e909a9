//! Governance HTTP surface.

pub mod auth;
pub mod clusters;
pub mod explorer;
pub mod history;
pub mod proposals;
pub mod snapshots;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use gatehouse_db::DbError;
use gatehouse_security::{CryptoError, SecretBox};
use tower_http::trace::TraceLayer;

use crate::clickhouse::ClusterError;
use crate::db::{ClusterStore, HistoryStore, ProposalStore, SnapshotStore};
use crate::executor_client::{ExecutorClient, ExecutorError};

#[derive(Clone)]
pub struct AppState {
    pub clusters: ClusterStore,
    pub proposals: ProposalStore,
    pub snapshots: SnapshotStore,
    pub history: HistoryStore,
    pub secrets: SecretBox,
    pub executor: ExecutorClient,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/clusters", get(clusters::list_clusters).post(clusters::create_cluster))
        .route("/clusters/validate", post(clusters::validate_connection))
        .route(
            "/clusters/:cluster_id",
            patch(clusters::update_cluster).delete(clusters::delete_cluster),
        )
        .route("/clusters/:cluster_id/test", post(clusters::test_cluster))
        .route("/clusters/:cluster_id/diagnostics", get(clusters::cluster_diagnostics))
        .route("/clusters/:cluster_id/databases", get(clusters::list_databases))
        .route("/clusters/:cluster_id/tables", get(clusters::list_tables))
        .route("/clusters/:cluster_id/columns", get(clusters::list_columns))
        .route("/snapshots", get(snapshots::list_snapshots))
        .route("/snapshots/collect", post(snapshots::collect_snapshot))
        .route("/snapshots/diff", get(snapshots::diff_snapshots))
        .route("/snapshots/:snapshot_id", get(snapshots::get_snapshot))
        .route("/explorer/users", get(explorer::list_users))
        .route("/explorer/users/:name", get(explorer::get_user))
        .route("/explorer/roles", get(explorer::list_roles))
        .route("/explorer/roles/:name", get(explorer::get_role))
        .route("/explorer/objects/:database", get(explorer::database_access))
        .route("/explorer/objects/:database/:table", get(explorer::table_access))
        .route("/proposals", get(proposals::list_proposals).post(proposals::create_proposal))
        .route("/proposals/legacy", post(proposals::create_legacy_proposal))
        .route("/proposals/:proposal_id", get(proposals::get_proposal))
        .route("/proposals/:proposal_id/approve", post(proposals::approve_proposal))
        .route("/proposals/:proposal_id/reject", post(proposals::reject_proposal))
        .route("/proposals/:proposal_id/dry-run", post(proposals::dry_run_proposal))
        .route("/proposals/:proposal_id/execute", post(proposals::execute_proposal))
        .route("/proposals/:proposal_id/jobs", get(proposals::proposal_jobs))
        .route("/history", get(history::entity_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope for the governance API. Carries a code and a
/// human-readable message; stack traces never cross the boundary.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unsupported(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Unsupported(m) => (StatusCode::NOT_IMPLEMENTED, m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(m) => Self::NotFound(m),
            DbError::Constraint(m) => Self::Conflict(m),
            DbError::InvalidState(m) => Self::BadRequest(m),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ExecutorError> for ApiError {
    fn from(e: ExecutorError) -> Self {
        Self::Upstream(e.to_string())
    }
}

impl From<ClusterError> for ApiError {
    fn from(e: ClusterError) -> Self {
        Self::Upstream(format!("Cluster error: {e}"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization error: {e}"))
    }
}
