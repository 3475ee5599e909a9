//! Executor database models.

use chrono::{DateTime, Utc};
use gatehouse_protocol::{JobMode, JobState, JobStepView, JobView, StepState};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Job {
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
}

#[derive(Debug, Clone, FromRow)]
pub struct JobStep {
    pub id: i64,
    pub job_id: i64,
    pub step_index: i64,
    pub operation_type: String,
    pub sql_statement: String,
    pub compensation_sql: Option<String>,
    pub status: StepState,
    pub result_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn into_view(self, steps: Vec<JobStep>) -> JobView {
        JobView {
            id: self.id,
            proposal_id: self.proposal_id,
            cluster_id: self.cluster_id,
            actor_user_id: self.actor_user_id,
            correlation_id: self.correlation_id,
            mode: self.mode,
            status: self.status,
            error: self.error,
            created_at: self.created_at,
            completed_at: self.completed_at,
            steps: steps.into_iter().map(JobStep::into_view).collect(),
        }
    }
}

impl JobStep {
    pub fn into_view(self) -> JobStepView {
        JobStepView {
            id: self.id,
            step_index: self.step_index,
            operation_type: self.operation_type,
            sql_statement: self.sql_statement,
            compensation_sql: self.compensation_sql,
            status: self.status,
            result_message: self.result_message,
            executed_at: self.executed_at,
        }
    }
}
