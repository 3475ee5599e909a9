//! Canonical enums and job wire types.
//!
//! The string `operation_type` plus an untyped `params` blob is the only
//! place operations stay stringly-typed; the templates crate parses them
//! into a closed enum before any SQL is rendered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status enums
// ============================================================================

/// Execution mode for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobMode {
    DryRun,
    Apply,
}

/// Lifecycle of a job row on the executor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    PartialFailure,
}

/// Per-step outcome within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Success,
    Error,
    Skipped,
    DryRunOk,
}

/// Proposal lifecycle on the governance side.
///
/// `rejected`, `executed`, `partially_executed`, and `failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Executing,
    Executed,
    PartiallyExecuted,
    Failed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::PartiallyExecuted => "partially_executed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ProposalKind {
    GrantSelect,
    RevokeSelect,
    MultiOperation,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GrantSelect => "grant_select",
            Self::RevokeSelect => "revoke_select",
            Self::MultiOperation => "multi_operation",
        }
    }
}

/// Connection health of a registered cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum HealthState {
    NeverTested,
    Healthy,
    Failed,
}

// ============================================================================
// Job request (governance -> executor)
// ============================================================================

/// Connection target passed by value. `password_encrypted` is AEAD
/// ciphertext; the executor holds the same symmetric key and decrypts in
/// memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfigPayload {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: String,
    pub password_encrypted: String,
}

fn default_port() -> u16 {
    crate::defaults::DEFAULT_CLICKHOUSE_PORT
}

fn default_protocol() -> String {
    "http".to_string()
}

/// One ordered operation of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload {
    pub order_index: i64,
    pub operation_type: String,
    pub params: serde_json::Value,
}

/// Job submission. Deduplicated by `correlation_id`: re-posting the same id
/// returns the existing job untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub proposal_id: i64,
    pub cluster_id: i64,
    pub actor_user_id: i64,
    pub correlation_id: String,
    pub mode: JobMode,
    pub cluster_config: ClusterConfigPayload,
    pub operations: Vec<OperationPayload>,
}

// ============================================================================
// Job views (executor -> governance / operators)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStepView {
    pub id: i64,
    pub step_index: i64,
    pub operation_type: String,
    pub sql_statement: String,
    pub compensation_sql: Option<String>,
    pub status: StepState,
    pub result_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: i64,
    pub proposal_id: i64,
    pub cluster_id: i64,
    pub actor_user_id: i64,
    pub correlation_id: String,
    pub mode: JobMode,
    pub status: JobState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<JobStepView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobState::PartialFailure).unwrap(),
            "\"partial_failure\""
        );
        assert_eq!(
            serde_json::to_string(&StepState::DryRunOk).unwrap(),
            "\"dry_run_ok\""
        );
        assert_eq!(
            serde_json::to_string(&ProposalStatus::PartiallyExecuted).unwrap(),
            "\"partially_executed\""
        );
        assert_eq!(
            serde_json::to_string(&HealthState::NeverTested).unwrap(),
            "\"never_tested\""
        );
    }

    #[test]
    fn test_create_job_request_round_trip() {
        let json = serde_json::json!({
            "proposal_id": 7,
            "cluster_id": 1,
            "actor_user_id": 3,
            "correlation_id": "exec-7-deadbeef",
            "mode": "apply",
            "cluster_config": {
                "host": "ch.internal",
                "username": "default",
                "password_encrypted": "AAAA"
            },
            "operations": [
                {"order_index": 0, "operation_type": "create_role", "params": {"role_name": "readers"}}
            ]
        });
        let req: CreateJobRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.mode, JobMode::Apply);
        assert_eq!(req.cluster_config.port, 8123);
        assert_eq!(req.cluster_config.protocol, "http");
        assert_eq!(req.operations.len(), 1);
    }
}
