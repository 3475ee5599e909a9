//! Executor HTTP surface.
//!
//! Internal-only API: every route requires the shared service key. Errors
//! cross the boundary as `{ "error": ... }` with a mapped status code and
//! never include a backtrace.

pub mod jobs;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gatehouse_db::DbError;
use tower_http::trace::TraceLayer;

use crate::pipeline::{Pipeline, PipelineError};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub internal_api_key: Arc<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope for the executor API.
#[derive(Debug)]
pub enum ApiError {
    Forbidden,
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Forbidden => (StatusCode::FORBIDDEN, "Invalid internal API key".to_string()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(m) => Self::NotFound(m),
            DbError::Constraint(m) | DbError::InvalidState(m) => Self::BadRequest(m),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Db(db) => db.into(),
            PipelineError::Decrypt(c) => Self::BadRequest(c.to_string()),
        }
    }
}
