//! Proposal lifecycle endpoints: draft, review, dry-run, execute.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use gatehouse_protocol::correlation::{apply_correlation_id, dry_run_correlation_id};
use gatehouse_protocol::{
    ClusterConfigPayload, CreateJobRequest, JobMode, JobView, OperationPayload, ProposalKind,
    ProposalStatus, StepState,
};
use gatehouse_templates::{Operation, TemplateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::auth::Actor;
use super::{ApiError, AppState};
use crate::db::models::{Cluster, Proposal, ProposalOperation};
use crate::db::{NewOperation, NewProposal};
use crate::proposals::{
    build_previews, extract_entity, legacy_operation_type, operations_payload,
    proposal_status_for_job,
};

#[derive(Debug, Deserialize)]
pub struct OperationInput {
    pub operation_type: String,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub cluster_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    #[serde(default)]
    pub is_elevated: bool,
    pub operations: Vec<OperationInput>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLegacyProposalRequest {
    pub cluster_id: i64,
    pub kind: ProposalKind,
    pub database: String,
    pub table: String,
    pub target_type: String,
    pub target_name: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReviewRequest {
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OperationOut {
    pub id: i64,
    pub order_index: i64,
    pub operation_type: String,
    pub params: Value,
    pub sql_preview: Option<String>,
    pub compensation_sql: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProposalOut {
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
    pub db_name: Option<String>,
    pub table_name: Option<String>,
    pub target_type: Option<String>,
    pub target_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub operations: Vec<OperationOut>,
    /// Broad-privilege review warnings; only populated on creation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn operation_out(op: ProposalOperation) -> OperationOut {
    let params = serde_json::from_str(&op.params).unwrap_or(Value::Null);
    OperationOut {
        id: op.id,
        order_index: op.order_index,
        operation_type: op.operation_type,
        params,
        sql_preview: op.sql_preview,
        compensation_sql: op.compensation_sql,
    }
}

async fn proposal_out(
    state: &AppState,
    proposal: Proposal,
    warnings: Vec<String>,
) -> Result<ProposalOut, ApiError> {
    let operations = state.proposals.operations_for(proposal.id).await?;
    Ok(ProposalOut {
        id: proposal.id,
        cluster_id: proposal.cluster_id,
        created_by: proposal.created_by,
        status: proposal.status,
        kind: proposal.kind,
        title: proposal.title,
        description: proposal.description,
        reason: proposal.reason,
        is_elevated: proposal.is_elevated,
        sql_preview: proposal.sql_preview,
        compensation_sql: proposal.compensation_sql,
        job_id: proposal.job_id,
        executed_by: proposal.executed_by,
        executed_at: proposal.executed_at,
        db_name: proposal.db_name,
        table_name: proposal.table_name,
        target_type: proposal.target_type,
        target_name: proposal.target_name,
        created_at: proposal.created_at,
        updated_at: proposal.updated_at,
        operations: operations.into_iter().map(operation_out).collect(),
        warnings,
    })
}

// ── creation ────────────────────────────────────────────────────────────

pub async fn create_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalOut>), ApiError> {
    actor.require_editor()?;
    state.clusters.get(request.cluster_id).await?;

    if request.operations.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one operation required".to_string(),
        ));
    }
    // Reject operation types the builders will never accept, up front.
    for op in &request.operations {
        if let Err(TemplateError::UnknownOperation(unknown)) =
            Operation::parse(&op.operation_type, &Value::Object(Default::default()))
        {
            return Err(ApiError::Unsupported(format!(
                "Unsupported operation type: {unknown}"
            )));
        }
    }

    let pairs: Vec<(String, Value)> = request
        .operations
        .iter()
        .map(|op| (op.operation_type.clone(), op.params.clone()))
        .collect();
    let bundle = build_previews(&pairs);

    let operations: Vec<NewOperation> = request
        .operations
        .iter()
        .zip(bundle.per_operation.iter())
        .enumerate()
        .map(|(index, (op, (sql, compensation)))| NewOperation {
            order_index: index as i64,
            operation_type: op.operation_type.clone(),
            params: op.params.to_string(),
            sql_preview: Some(sql.clone()),
            compensation_sql: compensation.clone(),
        })
        .collect();

    let proposal = state
        .proposals
        .create(
            NewProposal {
                cluster_id: request.cluster_id,
                created_by: actor.user_id,
                kind: ProposalKind::MultiOperation,
                title: request.title,
                description: request.description,
                reason: request.reason,
                is_elevated: request.is_elevated || !bundle.warnings.is_empty(),
                sql_preview: Some(bundle.sql_preview.clone()),
                compensation_sql: bundle.compensation_sql.clone(),
                db_name: None,
                table_name: None,
                target_type: None,
                target_name: None,
            },
            operations,
        )
        .await?;

    info!(
        proposal_id = proposal.id,
        actor = actor.user_id,
        operations = request.operations.len(),
        "proposal_created"
    );
    let out = proposal_out(&state, proposal, bundle.warnings).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

pub async fn create_legacy_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateLegacyProposalRequest>,
) -> Result<(StatusCode, Json<ProposalOut>), ApiError> {
    actor.require_editor()?;
    let operation_type = legacy_operation_type(request.kind).ok_or_else(|| {
        ApiError::BadRequest("kind must be grant_select or revoke_select".to_string())
    })?;
    if request.target_type != "user" && request.target_type != "role" {
        return Err(ApiError::BadRequest(
            "target_type must be 'user' or 'role'".to_string(),
        ));
    }
    state.clusters.get(request.cluster_id).await?;

    let params = serde_json::json!({
        "privilege": "SELECT",
        "database": request.database,
        "table": request.table,
        "target_type": request.target_type,
        "target_name": request.target_name,
    });
    let bundle = build_previews(&[(operation_type.to_string(), params)]);

    let proposal = state
        .proposals
        .create(
            NewProposal {
                cluster_id: request.cluster_id,
                created_by: actor.user_id,
                kind: request.kind,
                title: None,
                description: None,
                reason: request.reason,
                is_elevated: false,
                sql_preview: Some(bundle.sql_preview.clone()),
                compensation_sql: bundle.compensation_sql.clone(),
                db_name: Some(request.database),
                table_name: Some(request.table),
                target_type: Some(request.target_type),
                target_name: Some(request.target_name),
            },
            Vec::new(),
        )
        .await?;

    info!(proposal_id = proposal.id, actor = actor.user_id, "proposal_created");
    let out = proposal_out(&state, proposal, Vec::new()).await?;
    Ok((StatusCode::CREATED, Json(out)))
}

// ── reads ───────────────────────────────────────────────────────────────

pub async fn list_proposals(
    State(state): State<AppState>,
    _actor: Actor,
) -> Result<Json<Vec<ProposalOut>>, ApiError> {
    let proposals = state.proposals.list().await?;
    let mut out = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        out.push(proposal_out(&state, proposal, Vec::new()).await?);
    }
    Ok(Json(out))
}

pub async fn get_proposal(
    State(state): State<AppState>,
    _actor: Actor,
    Path(proposal_id): Path<i64>,
) -> Result<Json<ProposalOut>, ApiError> {
    let proposal = state.proposals.get(proposal_id).await?;
    Ok(Json(proposal_out(&state, proposal, Vec::new()).await?))
}

// ── review ──────────────────────────────────────────────────────────────

async fn review(
    state: &AppState,
    actor: Actor,
    proposal_id: i64,
    to: ProposalStatus,
    comment: Option<String>,
) -> Result<ProposalOut, ApiError> {
    let (verb, decision) = match to {
        ProposalStatus::Approved => ("approve", "approved"),
        _ => ("reject", "rejected"),
    };
    actor.require_admin()?;
    let proposal = state.proposals.get(proposal_id).await?;

    let won = state
        .proposals
        .cas_status(proposal_id, ProposalStatus::Submitted, to)
        .await?;
    if !won {
        // Either never submitted, or another reviewer decided first.
        let current = state.proposals.get(proposal_id).await?.status;
        return Err(ApiError::BadRequest(format!(
            "Can only {verb} submitted proposals (current: {current})"
        )));
    }

    state
        .proposals
        .add_review(proposal.id, actor.user_id, decision, comment.as_deref())
        .await?;
    info!(proposal_id, actor = actor.user_id, decision, "proposal_reviewed");

    let proposal = state.proposals.get(proposal_id).await?;
    proposal_out(state, proposal, Vec::new()).await
}

pub async fn approve_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Path(proposal_id): Path<i64>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<ProposalOut>, ApiError> {
    let comment = body.and_then(|Json(r)| r.comment);
    let out = review(&state, actor, proposal_id, ProposalStatus::Approved, comment).await?;
    Ok(Json(out))
}

pub async fn reject_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Path(proposal_id): Path<i64>,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<ProposalOut>, ApiError> {
    let comment = body.and_then(|Json(r)| r.comment);
    let out = review(&state, actor, proposal_id, ProposalStatus::Rejected, comment).await?;
    Ok(Json(out))
}

// ── execution ───────────────────────────────────────────────────────────

async fn job_request_for(
    state: &AppState,
    proposal: &Proposal,
    cluster: &Cluster,
    actor: Actor,
    mode: JobMode,
    correlation_id: String,
) -> Result<CreateJobRequest, ApiError> {
    let rows = state.proposals.operations_for(proposal.id).await?;
    let operations = operations_payload(proposal, &rows)?;
    if operations.is_empty() {
        return Err(ApiError::BadRequest(
            "Proposal has no executable operations".to_string(),
        ));
    }
    Ok(CreateJobRequest {
        proposal_id: proposal.id,
        cluster_id: cluster.id,
        actor_user_id: actor.user_id,
        correlation_id,
        mode,
        cluster_config: ClusterConfigPayload {
            host: cluster.host.clone(),
            port: cluster.port as u16,
            protocol: cluster.protocol.clone(),
            username: cluster.username.clone(),
            password_encrypted: cluster.password_encrypted.clone(),
        },
        operations,
    })
}

pub async fn dry_run_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Path(proposal_id): Path<i64>,
) -> Result<Json<JobView>, ApiError> {
    actor.require_admin()?;
    let proposal = state.proposals.get(proposal_id).await?;
    if !matches!(
        proposal.status,
        ProposalStatus::Submitted | ProposalStatus::Approved
    ) {
        return Err(ApiError::BadRequest(format!(
            "Proposal must be submitted or approved for dry-run (current: {})",
            proposal.status
        )));
    }
    let cluster = state.clusters.get(proposal.cluster_id).await?;

    let request = job_request_for(
        &state,
        &proposal,
        &cluster,
        actor,
        JobMode::DryRun,
        dry_run_correlation_id(proposal.id),
    )
    .await?;

    // Dry-run leaves the proposal status untouched.
    let job = state.executor.create_job(&request).await?;
    Ok(Json(job))
}

pub async fn execute_proposal(
    State(state): State<AppState>,
    actor: Actor,
    Path(proposal_id): Path<i64>,
) -> Result<Json<JobView>, ApiError> {
    actor.require_admin()?;
    let proposal = state.proposals.get(proposal_id).await?;
    let cluster = state.clusters.get(proposal.cluster_id).await?;

    // Claim the transition before any cluster-visible work; a losing racer
    // sees the proposal already executing.
    let claimed = state
        .proposals
        .claim_for_execution(proposal_id, actor.user_id)
        .await?;
    if !claimed {
        let current = state.proposals.get(proposal_id).await?.status;
        return Err(ApiError::BadRequest(format!(
            "Can only execute approved proposals (current: {current})"
        )));
    }

    let request = match job_request_for(
        &state,
        &proposal,
        &cluster,
        actor,
        JobMode::Apply,
        apply_correlation_id(proposal.id),
    )
    .await
    {
        Ok(request) => request,
        Err(e) => {
            state
                .proposals
                .record_outcome(proposal_id, ProposalStatus::Failed, None)
                .await?;
            return Err(e);
        }
    };

    let job = match state.executor.create_job(&request).await {
        Ok(job) => job,
        Err(e) => {
            error!(proposal_id, error = %e, "Executor call failed");
            state
                .proposals
                .record_outcome(proposal_id, ProposalStatus::Failed, None)
                .await?;
            return Err(e.into());
        }
    };

    let final_status = proposal_status_for_job(job.status);
    state
        .proposals
        .record_outcome(proposal_id, final_status, Some(job.id))
        .await?;

    record_entity_history(&state, &proposal, cluster.id, actor, &job, &request.operations).await?;
    info!(
        proposal_id,
        job_id = job.id,
        status = %final_status,
        actor = actor.user_id,
        "proposal_executed"
    );
    Ok(Json(job))
}

/// Write one entity-history row per successfully applied step.
async fn record_entity_history(
    state: &AppState,
    proposal: &Proposal,
    cluster_id: i64,
    actor: Actor,
    job: &JobView,
    operations: &[OperationPayload],
) -> Result<(), ApiError> {
    for step in &job.steps {
        if step.status != StepState::Success {
            continue;
        }
        let Some(op) = operations.iter().find(|op| op.order_index == step.step_index) else {
            continue;
        };
        let Some((entity_type, entity_name)) = extract_entity(&op.operation_type, &op.params)
        else {
            continue;
        };
        let details = masked_params(&op.params).to_string();
        state
            .history
            .record(
                cluster_id,
                &entity_type,
                &entity_name,
                &op.operation_type,
                Some(&details),
                Some(proposal.id),
                Some(job.id),
                Some(actor.user_id),
            )
            .await?;
    }
    Ok(())
}

/// History rows keep the operation params for context, with any password
/// replaced before persistence.
fn masked_params(params: &Value) -> Value {
    let mut masked = params.clone();
    if let Some(obj) = masked.as_object_mut() {
        if obj.contains_key("password") {
            obj.insert("password".to_string(), Value::String("***".to_string()));
        }
    }
    masked
}

pub async fn proposal_jobs(
    State(state): State<AppState>,
    _actor: Actor,
    Path(proposal_id): Path<i64>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    state.proposals.get(proposal_id).await?;
    let jobs = state.executor.list_jobs_for_proposal(proposal_id).await?;
    Ok(Json(jobs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_params_replaces_password_only() {
        let params = serde_json::json!({"username": "svc", "password": "hunter2"});
        let masked = masked_params(&params);
        assert_eq!(masked["password"], "***");
        assert_eq!(masked["username"], "svc");

        let params = serde_json::json!({"role_name": "readers"});
        assert_eq!(masked_params(&params), params);
    }
}
