//! Executor schema creation - single source of truth for its tables.

use gatehouse_db::{DbPool, Result};
use tracing::info;

/// Ensure all executor tables exist.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            proposal_id INTEGER NOT NULL,
            cluster_id INTEGER NOT NULL,
            actor_user_id INTEGER NOT NULL,
            correlation_id TEXT NOT NULL UNIQUE,
            mode TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            error TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS job_steps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES jobs(id),
            step_index INTEGER NOT NULL,
            operation_type TEXT NOT NULL,
            sql_statement TEXT NOT NULL,
            compensation_sql TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            result_message TEXT,
            executed_at TEXT,
            UNIQUE(job_id, step_index)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_proposal ON jobs(proposal_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_steps_job ON job_steps(job_id)")
        .execute(pool)
        .await?;

    info!("Executor database schema verified");
    Ok(())
}
