//! Entity-history read endpoint.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::Actor;
use super::{ApiError, AppState};
use crate::db::models::EntityHistory;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cluster_id: i64,
    pub entity_type: String,
    pub entity_name: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct EntityHistoryOut {
    pub id: i64,
    pub cluster_id: i64,
    pub entity_type: String,
    pub entity_name: String,
    pub action: String,
    pub details: Option<Value>,
    pub proposal_id: Option<i64>,
    pub job_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<EntityHistory> for EntityHistoryOut {
    fn from(entry: EntityHistory) -> Self {
        let details = entry
            .details
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self {
            id: entry.id,
            cluster_id: entry.cluster_id,
            entity_type: entry.entity_type,
            entity_name: entry.entity_name,
            action: entry.action,
            details,
            proposal_id: entry.proposal_id,
            job_id: entry.job_id,
            actor_user_id: entry.actor_user_id,
            created_at: entry.created_at,
        }
    }
}

/// GET /history?cluster_id&entity_type&entity_name - applied changes for
/// one entity, newest first.
pub async fn entity_history(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<EntityHistoryOut>>, ApiError> {
    let limit = query.limit.clamp(1, 500);
    let entries = state
        .history
        .for_entity(query.cluster_id, &query.entity_type, &query.entity_name, limit)
        .await?;
    Ok(Json(entries.into_iter().map(EntityHistoryOut::from).collect()))
}
