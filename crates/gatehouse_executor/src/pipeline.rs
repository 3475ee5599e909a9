//! The job pipeline: idempotent admission, per-step template rendering and
//! execution, and final status classification.
//!
//! Per-step failures are contained - they flip the remaining steps to
//! `skipped` and never propagate as errors. Only admission-level problems
//! (storage, undecryptable credentials) surface as [`PipelineError`].

use gatehouse_db::DbError;
use gatehouse_protocol::{CreateJobRequest, JobMode, JobState, JobView, OperationPayload, StepState};
use gatehouse_security::{redact_statement, CryptoError, SecretBox};
use gatehouse_templates::{build_statement, generate_preview, TemplateError};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clickhouse::{execute_statement, ClusterEndpoint};
use crate::db::JobStore;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Failed to decrypt cluster password: {0}")]
    Decrypt(#[from] CryptoError),
}

pub struct Pipeline {
    store: JobStore,
    secrets: SecretBox,
    http: reqwest::Client,
}

impl Pipeline {
    pub fn new(store: JobStore, secrets: SecretBox) -> Self {
        Self {
            store,
            secrets,
            http: reqwest::Client::new(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run a job to completion and return its final view.
    ///
    /// Idempotent on `correlation_id`: if a job with that id already
    /// exists, it is returned untouched and nothing executes.
    pub async fn run_job(&self, request: CreateJobRequest) -> Result<JobView, PipelineError> {
        if let Some(existing) = self
            .store
            .find_by_correlation(&request.correlation_id)
            .await?
        {
            info!(
                job_id = existing.id,
                correlation_id = %request.correlation_id,
                "Duplicate submission, returning existing job"
            );
            return Ok(self.store.job_view(existing.id).await?);
        }

        // Decrypt before any rows are written; an unusable secret fails the
        // whole submission, not a half-recorded job.
        let password = self
            .secrets
            .decrypt(&request.cluster_config.password_encrypted)?;
        let endpoint = ClusterEndpoint {
            host: request.cluster_config.host.clone(),
            port: request.cluster_config.port,
            protocol: request.cluster_config.protocol.clone(),
            username: request.cluster_config.username.clone(),
            password,
        };

        let job = match self
            .store
            .insert_job(
                request.proposal_id,
                request.cluster_id,
                request.actor_user_id,
                &request.correlation_id,
                request.mode,
            )
            .await
        {
            Ok(job) => job,
            // Lost an admission race on the unique index; the winner's job
            // is the result.
            Err(DbError::Constraint(_)) => {
                let existing = self
                    .store
                    .find_by_correlation(&request.correlation_id)
                    .await?
                    .ok_or_else(|| {
                        DbError::constraint(format!(
                            "duplicate correlation_id {} with no surviving job",
                            request.correlation_id
                        ))
                    })?;
                return Ok(self.store.job_view(existing.id).await?);
            }
            Err(e) => return Err(e.into()),
        };

        let mut operations = request.operations;
        operations.sort_by_key(|op| op.order_index);

        // Each step is re-rendered from its params and then handled in
        // order. The first failure (template or cluster) flips every later
        // step to skipped without executing it.
        let mut outcomes: Vec<(i64, StepState)> = Vec::with_capacity(operations.len());
        let mut cluster_failed = false;

        for (pos, op) in operations.iter().enumerate() {
            if cluster_failed {
                self.record_skipped(job.id, op, "Skipped due to earlier failure")
                    .await?;
                outcomes.push((op.order_index, StepState::Skipped));
                continue;
            }

            let stmt = match build_statement(&op.operation_type, &op.params) {
                Ok(stmt) => stmt,
                Err(e) => {
                    // A template error blocks the entire job at this step.
                    self.record_template_failure(job.id, pos, op, &e, &operations)
                        .await?;
                    return Ok(self.store.job_view(job.id).await?);
                }
            };

            match request.mode {
                JobMode::DryRun => {
                    self.store
                        .insert_step(
                            job.id,
                            op.order_index,
                            &op.operation_type,
                            &stmt.sql,
                            stmt.compensation.as_deref(),
                            StepState::DryRunOk,
                            Some("Validation passed"),
                            true,
                        )
                        .await?;
                    outcomes.push((op.order_index, StepState::DryRunOk));
                }
                JobMode::Apply => {
                    info!(
                        job_id = job.id,
                        step_index = op.order_index,
                        sql = %redact_statement(&stmt.sql),
                        "Executing step"
                    );
                    match execute_statement(&self.http, &endpoint, &stmt.sql).await {
                        Ok(result) => {
                            let message = if result.is_empty() { "OK" } else { result.as_str() };
                            self.store
                                .insert_step(
                                    job.id,
                                    op.order_index,
                                    &op.operation_type,
                                    &stmt.sql,
                                    stmt.compensation.as_deref(),
                                    StepState::Success,
                                    Some(message),
                                    true,
                                )
                                .await?;
                            outcomes.push((op.order_index, StepState::Success));
                        }
                        Err(e) => {
                            warn!(
                                job_id = job.id,
                                step_index = op.order_index,
                                error = e.message(),
                                "Step failed"
                            );
                            self.store
                                .insert_step(
                                    job.id,
                                    op.order_index,
                                    &op.operation_type,
                                    &stmt.sql,
                                    stmt.compensation.as_deref(),
                                    StepState::Error,
                                    Some(e.message()),
                                    true,
                                )
                                .await?;
                            outcomes.push((op.order_index, StepState::Error));
                            cluster_failed = true;
                        }
                    }
                }
            }
        }

        let (status, job_error) = match request.mode {
            JobMode::DryRun => (JobState::Completed, None),
            JobMode::Apply => classify(&outcomes),
        };
        self.store
            .finalize_job(job.id, status, job_error.as_deref())
            .await?;

        Ok(self.store.job_view(job.id).await?)
    }

    async fn record_skipped(
        &self,
        job_id: i64,
        op: &OperationPayload,
        message: &str,
    ) -> Result<(), PipelineError> {
        let (sql, compensation) = display_sql(op);
        self.store
            .insert_step(
                job_id,
                op.order_index,
                &op.operation_type,
                &sql,
                compensation.as_deref(),
                StepState::Skipped,
                Some(message),
                false,
            )
            .await?;
        Ok(())
    }

    async fn record_template_failure(
        &self,
        job_id: i64,
        failed_pos: usize,
        failed_op: &OperationPayload,
        err: &TemplateError,
        operations: &[OperationPayload],
    ) -> Result<(), PipelineError> {
        error!(
            job_id,
            step_index = failed_op.order_index,
            %err,
            "Template error, failing job"
        );
        self.store
            .insert_step(
                job_id,
                failed_op.order_index,
                &failed_op.operation_type,
                &format!("-- TEMPLATE ERROR: {err}"),
                None,
                StepState::Error,
                Some(&err.to_string()),
                true,
            )
            .await?;

        for remaining in &operations[failed_pos + 1..] {
            self.record_skipped(job_id, remaining, "Skipped due to earlier error")
                .await?;
        }

        self.store
            .finalize_job(
                job_id,
                JobState::Failed,
                Some(&format!(
                    "Template error at step {}: {}",
                    failed_op.order_index, err
                )),
            )
            .await?;
        Ok(())
    }
}

/// Best-effort display SQL for a step that never executes. The masked
/// preview is used when it renders; broken operations get a placeholder.
fn display_sql(op: &OperationPayload) -> (String, Option<String>) {
    let preview = generate_preview(&op.operation_type, &op.params);
    if preview.sql.starts_with("--") {
        (
            format!("-- TEMPLATE ERROR for {}", op.operation_type),
            None,
        )
    } else {
        (preview.sql, preview.compensation)
    }
}

/// Final job status over the set of step outcomes.
fn classify(outcomes: &[(i64, StepState)]) -> (JobState, Option<String>) {
    let has_error = outcomes.iter().any(|(_, s)| *s == StepState::Error);
    let has_success = outcomes.iter().any(|(_, s)| *s == StepState::Success);

    let status = match (has_error, has_success) {
        (true, true) => JobState::PartialFailure,
        (true, false) => JobState::Failed,
        (false, _) => JobState::Completed,
    };

    let error = has_error.then(|| {
        let failing: Vec<i64> = outcomes
            .iter()
            .filter(|(_, s)| *s == StepState::Error)
            .map(|(i, _)| *i)
            .collect();
        format!("Failed at step(s): {failing:?}")
    });

    (status, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_all_success() {
        let outcomes = vec![(0, StepState::Success), (1, StepState::Success)];
        assert_eq!(classify(&outcomes), (JobState::Completed, None));
    }

    #[test]
    fn test_classify_partial_failure() {
        let outcomes = vec![
            (0, StepState::Success),
            (1, StepState::Error),
            (2, StepState::Skipped),
        ];
        let (status, error) = classify(&outcomes);
        assert_eq!(status, JobState::PartialFailure);
        assert_eq!(error.as_deref(), Some("Failed at step(s): [1]"));
    }

    #[test]
    fn test_classify_failed_without_success() {
        let outcomes = vec![(0, StepState::Error), (1, StepState::Skipped)];
        let (status, error) = classify(&outcomes);
        assert_eq!(status, JobState::Failed);
        assert_eq!(error.as_deref(), Some("Failed at step(s): [0]"));
    }

    #[test]
    fn test_classify_empty_is_completed() {
        assert_eq!(classify(&[]), (JobState::Completed, None));
    }

    #[test]
    fn test_display_sql_for_broken_op_is_placeholder() {
        let op = OperationPayload {
            order_index: 2,
            operation_type: "create_role".to_string(),
            params: json!({"role_name": ""}),
        };
        let (sql, comp) = display_sql(&op);
        assert_eq!(sql, "-- TEMPLATE ERROR for create_role");
        assert!(comp.is_none());

        let op = OperationPayload {
            order_index: 2,
            operation_type: "create_role".to_string(),
            params: json!({"role_name": "readers"}),
        };
        let (sql, _) = display_sql(&op);
        assert_eq!(sql, "CREATE ROLE `readers`");
    }
}
