//! Snapshot run persistence.
//!
//! Entity rows are written once while the run completes and never mutated
//! afterwards; a later snapshot of the same cluster creates new rows under
//! a new run id. Deleting a run cascades to its entities.

use chrono::Utc;
use gatehouse_db::{DbError, DbPool, Result};

use super::models::SnapshotRun;

pub const RUN_RUNNING: &str = "running";
pub const RUN_COMPLETED: &str = "completed";
pub const RUN_FAILED: &str = "failed";

/// Entity counts attached to snapshot listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCounts {
    pub users: i64,
    pub roles: i64,
    pub grants: i64,
}

#[derive(Clone)]
pub struct SnapshotStore {
    pool: DbPool,
}

impl SnapshotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a collection attempt in `running` state.
    pub async fn create_run(&self, cluster_id: i64) -> Result<SnapshotRun> {
        let now = Utc::now().to_rfc3339();
        let id = sqlx::query(
            r#"
            INSERT INTO snapshot_runs (cluster_id, status, started_at, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(cluster_id)
        .bind(RUN_RUNNING)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.get_run(id).await
    }

    pub async fn complete_run(&self, id: i64, raw_payload: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE snapshot_runs SET status = ?, raw_payload = ?, completed_at = ? WHERE id = ?",
        )
        .bind(RUN_COMPLETED)
        .bind(raw_payload)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_run(&self, id: i64, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE snapshot_runs SET status = ?, error = ?, completed_at = ? WHERE id = ?")
            .bind(RUN_FAILED)
            .bind(error)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_run(&self, id: i64) -> Result<SnapshotRun> {
        sqlx::query_as::<_, SnapshotRun>("SELECT * FROM snapshot_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("snapshot {id}")))
    }

    pub async fn list_runs(&self, cluster_id: i64, limit: i64) -> Result<Vec<SnapshotRun>> {
        let runs = sqlx::query_as::<_, SnapshotRun>(
            "SELECT * FROM snapshot_runs WHERE cluster_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(cluster_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }

    /// Latest completed run for a cluster, if any.
    pub async fn latest_completed(&self, cluster_id: i64) -> Result<Option<SnapshotRun>> {
        let run = sqlx::query_as::<_, SnapshotRun>(
            r#"
            SELECT * FROM snapshot_runs
            WHERE cluster_id = ? AND status = ?
            ORDER BY id DESC LIMIT 1
            "#,
        )
        .bind(cluster_id)
        .bind(RUN_COMPLETED)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    pub async fn counts(&self, snapshot_id: i64) -> Result<SnapshotCounts> {
        let users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM snapshot_users WHERE snapshot_id = ?")
                .bind(snapshot_id)
                .fetch_one(&self.pool)
                .await?;
        let roles: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM snapshot_roles WHERE snapshot_id = ?")
                .bind(snapshot_id)
                .fetch_one(&self.pool)
                .await?;
        let grants: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM snapshot_privileges WHERE snapshot_id = ?")
                .bind(snapshot_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(SnapshotCounts { users, roles, grants })
    }

    // ── normalized entity inserts (collector only) ──────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_user(
        &self,
        snapshot_id: i64,
        name: &str,
        ch_id: &str,
        storage: Option<&str>,
        auth_type: Option<&str>,
        host_ip: &str,
        host_names: &str,
        default_roles_all: bool,
        default_roles_list: &str,
        grantees_any: bool,
        grantees_list: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshot_users
                (snapshot_id, name, ch_id, storage, auth_type, host_ip, host_names,
                 default_roles_all, default_roles_list, grantees_any, grantees_list)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(name)
        .bind(ch_id)
        .bind(storage)
        .bind(auth_type)
        .bind(host_ip)
        .bind(host_names)
        .bind(default_roles_all)
        .bind(default_roles_list)
        .bind(grantees_any)
        .bind(grantees_list)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_role(
        &self,
        snapshot_id: i64,
        name: &str,
        ch_id: &str,
        storage: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshot_roles (snapshot_id, name, ch_id, storage) VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot_id)
        .bind(name)
        .bind(ch_id)
        .bind(storage)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_role_grant(
        &self,
        snapshot_id: i64,
        user_name: Option<&str>,
        role_name: Option<&str>,
        granted_role_name: &str,
        is_default: bool,
        with_admin_option: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshot_role_grants
                (snapshot_id, user_name, role_name, granted_role_name, is_default, with_admin_option)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(user_name)
        .bind(role_name)
        .bind(granted_role_name)
        .bind(is_default)
        .bind(with_admin_option)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_privilege(
        &self,
        snapshot_id: i64,
        user_name: Option<&str>,
        role_name: Option<&str>,
        access_type: &str,
        database: Option<&str>,
        table_name: Option<&str>,
        column_name: Option<&str>,
        is_partial_revoke: bool,
        grant_option: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshot_privileges
                (snapshot_id, user_name, role_name, access_type, database,
                 table_name, column_name, is_partial_revoke, grant_option)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(user_name)
        .bind(role_name)
        .bind(access_type)
        .bind(database)
        .bind(table_name)
        .bind(column_name)
        .bind(is_partial_revoke)
        .bind(grant_option)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};

    async fn setup() -> SnapshotStore {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        SnapshotStore::new(pool)
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = setup().await;
        let run = store.create_run(1).await.unwrap();
        assert_eq!(run.status, RUN_RUNNING);
        assert!(run.started_at.is_some());

        store.complete_run(run.id, r#"{"users":[]}"#).await.unwrap();
        let run = store.get_run(run.id).await.unwrap();
        assert_eq!(run.status, RUN_COMPLETED);
        assert!(run.completed_at.is_some());
        assert_eq!(run.raw_payload.as_deref(), Some(r#"{"users":[]}"#));
    }

    #[tokio::test]
    async fn test_failed_run_records_error() {
        let store = setup().await;
        let run = store.create_run(1).await.unwrap();
        store.fail_run(run.id, "cluster unreachable").await.unwrap();
        let run = store.get_run(run.id).await.unwrap();
        assert_eq!(run.status, RUN_FAILED);
        assert_eq!(run.error.as_deref(), Some("cluster unreachable"));
    }

    #[tokio::test]
    async fn test_latest_completed_skips_failed_runs() {
        let store = setup().await;
        let first = store.create_run(1).await.unwrap();
        store.complete_run(first.id, "{}").await.unwrap();
        let second = store.create_run(1).await.unwrap();
        store.fail_run(second.id, "boom").await.unwrap();

        let latest = store.latest_completed(1).await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
        assert!(store.latest_completed(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counts() {
        let store = setup().await;
        let run = store.create_run(1).await.unwrap();
        store
            .insert_user(run.id, "alice", "uuid-1", Some("local_directory"), Some("sha256_password"),
                         "[]", "[]", false, "[]", false, "[]")
            .await
            .unwrap();
        store.insert_role(run.id, "readers", "uuid-2", None).await.unwrap();
        store
            .insert_privilege(run.id, Some("alice"), None, "SELECT", Some("db"), None, None, false, false)
            .await
            .unwrap();

        let counts = store.counts(run.id).await.unwrap();
        assert_eq!(counts.users, 1);
        assert_eq!(counts.roles, 1);
        assert_eq!(counts.grants, 1);
    }
}
