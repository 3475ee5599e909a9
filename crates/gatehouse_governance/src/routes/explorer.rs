//! RBAC explorer endpoints - browse users, roles, and object permissions
//! from a snapshot's graph.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::Actor;
use super::snapshots::parse_payload;
use super::{ApiError, AppState};
use crate::db::models::SnapshotRun;
use crate::graph::{
    EffectivePrivilege, InheritedRole, ObjectAccessEntry, RbacGraph, ResolvedRole, RoleMember,
};

#[derive(Debug, Deserialize)]
pub struct ExplorerQuery {
    pub cluster_id: i64,
    #[serde(default)]
    pub snapshot_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub auth_type: Option<String>,
    pub host_ip: Vec<String>,
    pub role_count: usize,
    pub direct_grant_count: usize,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub name: String,
    pub auth_type: Option<String>,
    pub host_ip: Vec<String>,
    pub default_roles_all: bool,
    pub default_roles: Vec<String>,
    pub all_roles: Vec<ResolvedRole>,
    pub effective_privileges: Vec<EffectivePrivilege>,
    pub settings_profiles: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub member_count: usize,
    pub direct_grant_count: usize,
}

#[derive(Debug, Serialize)]
pub struct RoleDetail {
    pub name: String,
    pub direct_grants: Vec<EffectivePrivilege>,
    pub inherited_roles: Vec<InheritedRole>,
    pub members: Vec<RoleMember>,
}

#[derive(Debug, Serialize)]
pub struct ObjectAccessOut {
    pub database: String,
    pub table: Option<String>,
    pub entries: Vec<ObjectAccessEntry>,
}

/// Load the requested snapshot, defaulting to the latest completed one.
async fn load_run(state: &AppState, query: &ExplorerQuery) -> Result<SnapshotRun, ApiError> {
    match query.snapshot_id {
        Some(id) => Ok(state.snapshots.get_run(id).await?),
        None => state
            .snapshots
            .latest_completed(query.cluster_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(
                    "No completed snapshot for this cluster. Collect one first.".to_string(),
                )
            }),
    }
}

async fn load_graph(state: &AppState, query: &ExplorerQuery) -> Result<RbacGraph, ApiError> {
    let run = load_run(state, query).await?;
    let raw = parse_payload(&run)?;
    Ok(RbacGraph::from_raw(&raw))
}

/// `auth_type` can arrive as a string or a list of mechanisms.
fn auth_type_of(info: &Value) -> Option<String> {
    match info.get("auth_type") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

fn flag(info: &Value, key: &str) -> bool {
    match info.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

fn string_list(info: &Value, key: &str) -> Vec<String> {
    info.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub async fn list_users(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    let summaries = graph
        .user_names()
        .iter()
        .map(|name| {
            let info = graph.user_info(name).cloned().unwrap_or(Value::Null);
            UserSummary {
                name: name.clone(),
                auth_type: auth_type_of(&info),
                host_ip: string_list(&info, "host_ip"),
                role_count: graph.resolve_user_roles(name).len(),
                direct_grant_count: graph.user_direct_grant_count(name),
            }
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn get_user(
    State(state): State<AppState>,
    _actor: Actor,
    Path(name): Path<String>,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<UserDetail>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    let info = graph
        .user_info(&name)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("User '{name}' not found in snapshot")))?;

    Ok(Json(UserDetail {
        auth_type: auth_type_of(&info),
        host_ip: string_list(&info, "host_ip"),
        default_roles_all: flag(&info, "default_roles_all"),
        default_roles: string_list(&info, "default_roles_list"),
        all_roles: graph.resolve_user_roles(&name),
        effective_privileges: graph.resolve_effective_privileges(&name),
        settings_profiles: graph.user_settings_profiles(&name),
        name,
    }))
}

pub async fn list_roles(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<Vec<RoleSummary>>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    let summaries = graph
        .role_names()
        .iter()
        .map(|name| RoleSummary {
            name: name.clone(),
            member_count: graph.role_members(name).len(),
            direct_grant_count: graph.role_direct_grant_count(name),
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn get_role(
    State(state): State<AppState>,
    _actor: Actor,
    Path(name): Path<String>,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<RoleDetail>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    if graph.role_info(&name).is_none() {
        return Err(ApiError::NotFound(format!(
            "Role '{name}' not found in snapshot"
        )));
    }
    Ok(Json(RoleDetail {
        direct_grants: graph.resolve_role_grants(&name),
        inherited_roles: graph.resolve_role_parents(&name),
        members: graph.role_members(&name),
        name,
    }))
}

pub async fn database_access(
    State(state): State<AppState>,
    _actor: Actor,
    Path(database): Path<String>,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<ObjectAccessOut>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    let entries = graph.object_access(&database, None);
    Ok(Json(ObjectAccessOut {
        database,
        table: None,
        entries,
    }))
}

pub async fn table_access(
    State(state): State<AppState>,
    _actor: Actor,
    Path((database, table)): Path<(String, String)>,
    Query(query): Query<ExplorerQuery>,
) -> Result<Json<ObjectAccessOut>, ApiError> {
    let graph = load_graph(&state, &query).await?;
    let table = (table != "*").then_some(table);
    let entries = graph.object_access(&database, table.as_deref());
    Ok(Json(ObjectAccessOut {
        database,
        table,
        entries,
    }))
}
