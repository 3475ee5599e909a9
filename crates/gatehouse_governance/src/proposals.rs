//! Proposal engine helpers: preview assembly, executor payload
//! construction, job-result mapping, and entity-history extraction.

use gatehouse_protocol::{JobState, OperationPayload, ProposalKind, ProposalStatus};
use gatehouse_templates::generate_preview;
use serde_json::{json, Value};

use crate::db::models::{Proposal, ProposalOperation};

/// Joined previews for a whole proposal.
#[derive(Debug, Clone)]
pub struct PreviewBundle {
    /// Newline-joined forward previews, in operation order.
    pub sql_preview: String,
    /// Newline-joined compensations in reverse order, skipping operations
    /// without one. None when nothing is reversible.
    pub compensation_sql: Option<String>,
    /// Broad-privilege warnings collected across operations.
    pub warnings: Vec<String>,
    /// Per-operation (preview, compensation) pairs, in operation order.
    pub per_operation: Vec<(String, Option<String>)>,
}

/// Render previews for an ordered operation list. Secrets are masked;
/// builder problems surface as `--` comments rather than failures.
pub fn build_previews(operations: &[(String, Value)]) -> PreviewBundle {
    let mut sql_parts = Vec::with_capacity(operations.len());
    let mut compensations = Vec::new();
    let mut warnings = Vec::new();
    let mut per_operation = Vec::with_capacity(operations.len());

    for (operation_type, params) in operations {
        let preview = generate_preview(operation_type, params);
        sql_parts.push(preview.sql.clone());
        if let Some(comp) = preview.compensation.clone() {
            compensations.push(comp);
        }
        if let Some(warning) = preview.warning.clone() {
            warnings.push(warning);
        }
        per_operation.push((preview.sql, preview.compensation));
    }

    // Compensation statements are surfaced in reverse order so an operator
    // rolling back manually undoes the last change first.
    compensations.reverse();
    PreviewBundle {
        sql_preview: sql_parts.join("\n"),
        compensation_sql: (!compensations.is_empty()).then(|| compensations.join("\n")),
        warnings,
        per_operation,
    }
}

/// The executor-side operation type for a single-op proposal kind.
///
/// Legacy proposals predate the operations table; their kind maps onto the
/// privilege builders with `SELECT` fixed.
pub fn legacy_operation_type(kind: ProposalKind) -> Option<&'static str> {
    match kind {
        ProposalKind::GrantSelect => Some("grant_privilege"),
        ProposalKind::RevokeSelect => Some("revoke_privilege"),
        ProposalKind::MultiOperation => None,
    }
}

/// Synthesize the single operation of a legacy proposal.
pub fn legacy_operation(proposal: &Proposal) -> Option<OperationPayload> {
    let operation_type = legacy_operation_type(proposal.kind)?;
    Some(OperationPayload {
        order_index: 0,
        operation_type: operation_type.to_string(),
        params: json!({
            "privilege": "SELECT",
            "database": proposal.db_name,
            "table": proposal.table_name,
            "target_type": proposal.target_type,
            "target_name": proposal.target_name,
        }),
    })
}

/// Build the operations payload for a job request: stored operation rows
/// for multi-op proposals, the synthesized legacy operation otherwise.
pub fn operations_payload(
    proposal: &Proposal,
    operations: &[ProposalOperation],
) -> Result<Vec<OperationPayload>, serde_json::Error> {
    if operations.is_empty() {
        if let Some(op) = legacy_operation(proposal) {
            return Ok(vec![op]);
        }
    }
    operations
        .iter()
        .map(|op| {
            Ok(OperationPayload {
                order_index: op.order_index,
                operation_type: op.operation_type.clone(),
                params: serde_json::from_str(&op.params)?,
            })
        })
        .collect()
}

/// Terminal proposal status for a finished job.
pub fn proposal_status_for_job(job_status: JobState) -> ProposalStatus {
    match job_status {
        JobState::Completed => ProposalStatus::Executed,
        JobState::PartialFailure => ProposalStatus::PartiallyExecuted,
        JobState::Pending | JobState::Running | JobState::Failed => ProposalStatus::Failed,
    }
}

/// Derive the `(entity_type, entity_name)` pair recorded in entity history
/// for a successfully applied operation. Unknown types record nothing.
pub fn extract_entity(operation_type: &str, params: &Value) -> Option<(String, String)> {
    let get = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let scoped = |key: &str| {
        params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("*")
            .to_string()
    };

    let pair = match operation_type {
        "create_user" | "alter_user_password" | "drop_user" | "set_default_roles" => {
            ("user".to_string(), get("username"))
        }
        "create_role" | "drop_role" => ("role".to_string(), get("role_name")),
        "grant_role" | "revoke_role" => (
            "role_assignment".to_string(),
            format!("{} -> {}", get("role_name"), get("target_name")),
        ),
        "grant_privilege" | "revoke_privilege" => (
            "privilege".to_string(),
            format!(
                "{} on {}.{}",
                get("privilege"),
                scoped("database"),
                scoped("table")
            ),
        ),
        "create_settings_profile" | "alter_settings_profile" | "drop_settings_profile" => {
            ("settings_profile".to_string(), get("name"))
        }
        "assign_settings_profile" => (
            "settings_profile".to_string(),
            format!("{} -> {}", get("profile_name"), get("target_name")),
        ),
        "create_quota" | "alter_quota" | "drop_quota" => ("quota".to_string(), get("name")),
        "assign_quota" => (
            "quota".to_string(),
            format!("{} -> {}", get("quota_name"), get("target_name")),
        ),
        "create_row_policy" | "alter_row_policy" | "drop_row_policy" => {
            ("row_policy".to_string(), get("name"))
        }
        _ => return None,
    };
    Some(pair)
}
