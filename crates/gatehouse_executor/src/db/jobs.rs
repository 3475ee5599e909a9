//! Job and step persistence.
//!
//! The unique index on `correlation_id` is the idempotency backstop: the
//! pipeline checks before inserting, and a concurrent duplicate insert
//! surfaces as a constraint error rather than a second execution.

use chrono::Utc;
use gatehouse_db::{DbError, DbPool, Result};
use gatehouse_protocol::{JobMode, JobState, JobView, StepState};
use tracing::info;

use super::models::{Job, JobStep};

#[derive(Clone)]
pub struct JobStore {
    pool: DbPool,
}

impl JobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_correlation(&self, correlation_id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE correlation_id = ?")
            .bind(correlation_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Insert a new job in `running` state and return the stored row.
    pub async fn insert_job(
        &self,
        proposal_id: i64,
        cluster_id: i64,
        actor_user_id: i64,
        correlation_id: &str,
        mode: JobMode,
    ) -> Result<Job> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query(
            r#"
            INSERT INTO jobs (proposal_id, cluster_id, actor_user_id, correlation_id, mode, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(proposal_id)
        .bind(cluster_id)
        .bind(actor_user_id)
        .bind(correlation_id)
        .bind(mode)
        .bind(JobState::Running)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::constraint(format!("duplicate correlation_id {correlation_id}"))
            }
            other => DbError::from(other),
        })?
        .last_insert_rowid();

        info!(job_id = id, correlation_id, "Job admitted");
        self.get_job(id).await
    }

    pub async fn insert_step(
        &self,
        job_id: i64,
        step_index: i64,
        operation_type: &str,
        sql_statement: &str,
        compensation_sql: Option<&str>,
        status: StepState,
        result_message: Option<&str>,
        executed: bool,
    ) -> Result<()> {
        let executed_at = executed.then(|| Utc::now().to_rfc3339());
        sqlx::query(
            r#"
            INSERT INTO job_steps
                (job_id, step_index, operation_type, sql_statement, compensation_sql,
                 status, result_message, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(step_index)
        .bind(operation_type)
        .bind(sql_statement)
        .bind(compensation_sql)
        .bind(status)
        .bind(result_message)
        .bind(executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_step(
        &self,
        job_id: i64,
        step_index: i64,
        status: StepState,
        result_message: Option<&str>,
        executed: bool,
    ) -> Result<()> {
        let executed_at = executed.then(|| Utc::now().to_rfc3339());
        sqlx::query(
            r#"
            UPDATE job_steps
            SET status = ?, result_message = ?, executed_at = COALESCE(?, executed_at)
            WHERE job_id = ? AND step_index = ?
            "#,
        )
        .bind(status)
        .bind(result_message)
        .bind(executed_at)
        .bind(job_id)
        .bind(step_index)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set the terminal status of a job.
    pub async fn finalize_job(
        &self,
        job_id: i64,
        status: JobState,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE jobs SET status = ?, error = ?, completed_at = ? WHERE id = ?")
            .bind(status)
            .bind(error)
            .bind(&now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id}")))
    }

    pub async fn steps_for(&self, job_id: i64) -> Result<Vec<JobStep>> {
        let steps = sqlx::query_as::<_, JobStep>(
            "SELECT * FROM job_steps WHERE job_id = ? ORDER BY step_index",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(steps)
    }

    pub async fn job_view(&self, job_id: i64) -> Result<JobView> {
        let job = self.get_job(job_id).await?;
        let steps = self.steps_for(job_id).await?;
        Ok(job.into_view(steps))
    }

    pub async fn list_views(&self, proposal_id: Option<i64>) -> Result<Vec<JobView>> {
        let jobs = match proposal_id {
            Some(pid) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE proposal_id = ? ORDER BY id DESC",
                )
                .bind(pid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        let mut views = Vec::with_capacity(jobs.len());
        for job in jobs {
            let steps = self.steps_for(job.id).await?;
            views.push(job.into_view(steps));
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};

    async fn setup() -> JobStore {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        JobStore::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_fetch_job() {
        let store = setup().await;
        let job = store
            .insert_job(1, 2, 3, "exec-1-abcd1234", JobMode::Apply)
            .await
            .unwrap();
        assert_eq!(job.status, JobState::Running);
        assert_eq!(job.mode, JobMode::Apply);
        assert!(job.completed_at.is_none());

        let found = store.find_by_correlation("exec-1-abcd1234").await.unwrap();
        assert_eq!(found.unwrap().id, job.id);
        assert!(store.find_by_correlation("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_correlation_is_constraint_error() {
        let store = setup().await;
        store
            .insert_job(1, 1, 1, "exec-1-dupe", JobMode::DryRun)
            .await
            .unwrap();
        let err = store
            .insert_job(1, 1, 1, "exec-1-dupe", JobMode::DryRun)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_step_lifecycle_and_view() {
        let store = setup().await;
        let job = store
            .insert_job(1, 1, 1, "exec-1-x", JobMode::Apply)
            .await
            .unwrap();

        store
            .insert_step(job.id, 0, "create_role", "CREATE ROLE `r`", Some("DROP ROLE IF EXISTS `r`"), StepState::Pending, None, false)
            .await
            .unwrap();
        store
            .update_step(job.id, 0, StepState::Success, Some("OK"), true)
            .await
            .unwrap();
        store
            .finalize_job(job.id, JobState::Completed, None)
            .await
            .unwrap();

        let view = store.job_view(job.id).await.unwrap();
        assert_eq!(view.status, JobState::Completed);
        assert_eq!(view.steps.len(), 1);
        assert_eq!(view.steps[0].status, StepState::Success);
        assert_eq!(view.steps[0].result_message.as_deref(), Some("OK"));
        assert!(view.steps[0].executed_at.is_some());
        assert!(view.completed_at.is_some());
    }
}
