//! Governance database models.

use chrono::{DateTime, Utc};
use gatehouse_protocol::{HealthState, ProposalKind, ProposalStatus};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: String,
    pub username: String,
    /// AEAD ciphertext. Never serialized to any API response.
    pub password_encrypted: String,
    pub default_database: Option<String>,
    pub created_by: i64,
    pub is_deleted: bool,
    pub health_status: HealthState,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub server_version: Option<String>,
    pub detected_current_user: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Proposal {
    pub id: i64,
    pub cluster_id: i64,
    pub created_by: i64,
    pub status: ProposalStatus,
    pub kind: ProposalKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub is_elevated: bool,
    pub sql_preview: Option<String>,
    pub compensation_sql: Option<String>,
    pub job_id: Option<i64>,
    pub executed_by: Option<i64>,
    pub executed_at: Option<DateTime<Utc>>,
    // Single-op proposals predate the operations table and keep their
    // target inline.
    pub db_name: Option<String>,
    pub table_name: Option<String>,
    pub target_type: Option<String>,
    pub target_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProposalOperation {
    pub id: i64,
    pub proposal_id: i64,
    pub order_index: i64,
    pub operation_type: String,
    /// JSON-encoded params blob, exactly as submitted.
    pub params: String,
    pub sql_preview: Option<String>,
    pub compensation_sql: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ProposalReview {
    pub id: i64,
    pub proposal_id: i64,
    pub reviewer_user_id: i64,
    pub decision: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRun {
    pub id: i64,
    pub cluster_id: i64,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_payload: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotUser {
    pub id: i64,
    pub snapshot_id: i64,
    pub name: String,
    pub ch_id: Option<String>,
    pub storage: Option<String>,
    pub auth_type: Option<String>,
    pub host_ip: Option<String>,
    pub host_names: Option<String>,
    pub default_roles_all: bool,
    pub default_roles_list: Option<String>,
    pub grantees_any: bool,
    pub grantees_list: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRole {
    pub id: i64,
    pub snapshot_id: i64,
    pub name: String,
    pub ch_id: Option<String>,
    pub storage: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRoleGrant {
    pub id: i64,
    pub snapshot_id: i64,
    pub user_name: Option<String>,
    pub role_name: Option<String>,
    pub granted_role_name: String,
    pub is_default: bool,
    pub with_admin_option: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct SnapshotPrivilege {
    pub id: i64,
    pub snapshot_id: i64,
    pub user_name: Option<String>,
    pub role_name: Option<String>,
    pub access_type: String,
    pub database: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub is_partial_revoke: bool,
    pub grant_option: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct EntityHistory {
    pub id: i64,
    pub cluster_id: i64,
    pub entity_type: String,
    pub entity_name: String,
    pub action: String,
    pub details: Option<String>,
    pub proposal_id: Option<i64>,
    pub job_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
