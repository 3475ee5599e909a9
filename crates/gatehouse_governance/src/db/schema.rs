//! Governance schema creation - single source of truth for its tables.

use gatehouse_db::{DbPool, Result};
use tracing::info;

/// Ensure all governance tables exist.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 8123,
            protocol TEXT NOT NULL DEFAULT 'http',
            username TEXT NOT NULL,
            password_encrypted TEXT NOT NULL,
            default_database TEXT,
            created_by INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            health_status TEXT NOT NULL DEFAULT 'never_tested',
            last_tested_at TEXT,
            latency_ms INTEGER,
            server_version TEXT,
            detected_current_user TEXT,
            error_code TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // Name uniqueness applies to live rows only; soft-deleted clusters keep
    // their name so old proposals and jobs still resolve.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_clusters_live_name
         ON clusters(name) WHERE is_deleted = 0",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS proposals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cluster_id INTEGER NOT NULL,
            created_by INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'submitted',
            kind TEXT NOT NULL,
            title TEXT,
            description TEXT,
            reason TEXT,
            is_elevated INTEGER NOT NULL DEFAULT 0,
            sql_preview TEXT,
            compensation_sql TEXT,
            job_id INTEGER,
            executed_by INTEGER,
            executed_at TEXT,
            db_name TEXT,
            table_name TEXT,
            target_type TEXT,
            target_name TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS proposal_operations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            proposal_id INTEGER NOT NULL REFERENCES proposals(id),
            order_index INTEGER NOT NULL,
            operation_type TEXT NOT NULL,
            params TEXT NOT NULL,
            sql_preview TEXT,
            compensation_sql TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(proposal_id, order_index)
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS proposal_reviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            proposal_id INTEGER NOT NULL REFERENCES proposals(id),
            reviewer_user_id INTEGER NOT NULL,
            decision TEXT NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS snapshot_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cluster_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            started_at TEXT,
            completed_at TEXT,
            raw_payload TEXT,
            error TEXT,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS snapshot_users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_runs(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            ch_id TEXT,
            storage TEXT,
            auth_type TEXT,
            host_ip TEXT,
            host_names TEXT,
            default_roles_all INTEGER NOT NULL DEFAULT 0,
            default_roles_list TEXT,
            grantees_any INTEGER NOT NULL DEFAULT 0,
            grantees_list TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS snapshot_roles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_runs(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            ch_id TEXT,
            storage TEXT
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS snapshot_role_grants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_runs(id) ON DELETE CASCADE,
            user_name TEXT,
            role_name TEXT,
            granted_role_name TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            with_admin_option INTEGER NOT NULL DEFAULT 0
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS snapshot_privileges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_runs(id) ON DELETE CASCADE,
            user_name TEXT,
            role_name TEXT,
            access_type TEXT NOT NULL,
            database TEXT,
            table_name TEXT,
            column_name TEXT,
            is_partial_revoke INTEGER NOT NULL DEFAULT 0,
            grant_option INTEGER NOT NULL DEFAULT 0
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS entity_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cluster_id INTEGER NOT NULL,
            entity_type TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT,
            proposal_id INTEGER,
            job_id INTEGER,
            actor_user_id INTEGER,
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_proposals_cluster ON proposals(cluster_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_operations_proposal ON proposal_operations(proposal_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshot_runs_cluster ON snapshot_runs(cluster_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshot_users_run ON snapshot_users(snapshot_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshot_privileges_run ON snapshot_privileges(snapshot_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_entity ON entity_history(cluster_id, entity_type, entity_name)")
        .execute(pool)
        .await?;

    info!("Governance database schema verified");
    Ok(())
}
