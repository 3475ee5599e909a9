//! Cluster registry and its health state machine.

use chrono::Utc;
use gatehouse_db::{DbError, DbPool, Result};
use gatehouse_protocol::HealthState;
use tracing::info;

use super::models::Cluster;
use crate::validator::ConnectionTestResult;

#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: String,
    pub username: String,
    pub password_encrypted: String,
    pub default_database: Option<String>,
    pub created_by: i64,
}

/// Partial update. `Some` means the field was present in the PATCH;
/// touching any critical field resets the health state machine.
#[derive(Debug, Clone, Default)]
pub struct ClusterUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password_encrypted: Option<String>,
    pub default_database: Option<Option<String>>,
}

impl ClusterUpdate {
    /// True when the update touches a field that invalidates previous
    /// connection diagnostics.
    pub fn touches_critical_field(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.protocol.is_some()
            || self.username.is_some()
            || self.password_encrypted.is_some()
    }
}

#[derive(Clone)]
pub struct ClusterStore {
    pool: DbPool,
}

impl ClusterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewCluster) -> Result<Cluster> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM clusters WHERE name = ? AND is_deleted = 0")
                .bind(&new.name)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(DbError::constraint(format!(
                "cluster name {:?} already exists",
                new.name
            )));
        }

        let now = Utc::now().to_rfc3339();
        let id = sqlx::query(
            r#"
            INSERT INTO clusters
                (name, host, port, protocol, username, password_encrypted,
                 default_database, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.host)
        .bind(new.port)
        .bind(&new.protocol)
        .bind(&new.username)
        .bind(&new.password_encrypted)
        .bind(&new.default_database)
        .bind(new.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::constraint(format!("cluster name {:?} already exists", new.name))
            }
            other => DbError::from(other),
        })?
        .last_insert_rowid();

        info!(cluster_id = id, name = %new.name, "Cluster registered");
        self.get(id).await
    }

    /// Fetch a live (non-deleted) cluster.
    pub async fn get(&self, id: i64) -> Result<Cluster> {
        sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("cluster {id}")))
    }

    pub async fn list(&self) -> Result<Vec<Cluster>> {
        let clusters =
            sqlx::query_as::<_, Cluster>("SELECT * FROM clusters WHERE is_deleted = 0 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(clusters)
    }

    /// Apply a partial update. Touching host, port, protocol, username, or
    /// password resets `health_status` to `never_tested` and clears every
    /// diagnostic field.
    pub async fn update(&self, id: i64, update: ClusterUpdate) -> Result<Cluster> {
        let current = self.get(id).await?;

        if let Some(new_name) = update.name.as_deref() {
            if new_name != current.name {
                let taken: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM clusters WHERE name = ? AND is_deleted = 0 AND id != ?",
                )
                .bind(new_name)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                if taken.is_some() {
                    return Err(DbError::constraint(format!(
                        "cluster name {new_name:?} already exists"
                    )));
                }
            }
        }

        let reset = update.touches_critical_field();
        let now = Utc::now().to_rfc3339();

        let name = update.name.unwrap_or(current.name);
        let host = update.host.unwrap_or(current.host);
        let port = update.port.unwrap_or(current.port);
        let protocol = update.protocol.unwrap_or(current.protocol);
        let username = update.username.unwrap_or(current.username);
        let password_encrypted = update
            .password_encrypted
            .unwrap_or(current.password_encrypted);
        let default_database = update.default_database.unwrap_or(current.default_database);

        if reset {
            sqlx::query(
                r#"
                UPDATE clusters
                SET name = ?, host = ?, port = ?, protocol = ?, username = ?,
                    password_encrypted = ?, default_database = ?,
                    health_status = ?, last_tested_at = NULL, latency_ms = NULL,
                    server_version = NULL, detected_current_user = NULL,
                    error_code = NULL, error_message = NULL,
                    updated_at = ?
                WHERE id = ? AND is_deleted = 0
                "#,
            )
            .bind(&name)
            .bind(&host)
            .bind(port)
            .bind(&protocol)
            .bind(&username)
            .bind(&password_encrypted)
            .bind(&default_database)
            .bind(HealthState::NeverTested)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            info!(cluster_id = id, "Critical field changed, health reset to never_tested");
        } else {
            sqlx::query(
                r#"
                UPDATE clusters
                SET name = ?, host = ?, port = ?, protocol = ?, username = ?,
                    password_encrypted = ?, default_database = ?, updated_at = ?
                WHERE id = ? AND is_deleted = 0
                "#,
            )
            .bind(&name)
            .bind(&host)
            .bind(port)
            .bind(&protocol)
            .bind(&username)
            .bind(&password_encrypted)
            .bind(&default_database)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }

        self.get(id).await
    }

    /// Soft-delete. The row stays so proposals, jobs, and history keep a
    /// resolvable reference.
    pub async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE clusters SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(DbError::not_found(format!("cluster {id}")));
        }
        info!(cluster_id = id, "Cluster soft-deleted");
        Ok(())
    }

    /// Persist the outcome of a connection probe.
    pub async fn record_probe(&self, id: i64, result: &ConnectionTestResult) -> Result<Cluster> {
        let status = if result.ok {
            HealthState::Healthy
        } else {
            HealthState::Failed
        };
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE clusters
            SET health_status = ?, last_tested_at = ?, latency_ms = ?,
                server_version = ?, detected_current_user = ?,
                error_code = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(status)
        .bind(&now)
        .bind(result.latency_ms)
        .bind(&result.server_version)
        .bind(&result.current_user)
        .bind(&result.error_code)
        .bind(if result.ok { None } else { Some(result.message.as_str()) })
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.get(id).await
    }

    /// How many proposals reference this cluster (for diagnostics).
    pub async fn dependency_count(&self, id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proposals WHERE cluster_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};

    async fn setup() -> ClusterStore {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        ClusterStore::new(pool)
    }

    fn sample() -> NewCluster {
        NewCluster {
            name: "analytics-prod".into(),
            host: "ch.internal".into(),
            port: 8123,
            protocol: "http".into(),
            username: "default".into(),
            password_encrypted: "ct".into(),
            default_database: None,
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn test_create_and_name_conflict() {
        let store = setup().await;
        let cluster = store.create(sample()).await.unwrap();
        assert_eq!(cluster.health_status, HealthState::NeverTested);

        let err = store.create(sample()).await.unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_frees_name_but_keeps_row() {
        let store = setup().await;
        let cluster = store.create(sample()).await.unwrap();
        store.soft_delete(cluster.id).await.unwrap();

        assert!(store.get(cluster.id).await.is_err());
        assert!(store.list().await.unwrap().is_empty());
        // The name is reusable after deletion.
        store.create(sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_critical_field_update_resets_health() {
        let store = setup().await;
        let cluster = store.create(sample()).await.unwrap();

        // Simulate a successful probe.
        let probe = ConnectionTestResult {
            ok: true,
            error_code: None,
            message: "Connection successful".into(),
            suggestions: vec![],
            latency_ms: Some(12),
            server_version: Some("24.3.1".into()),
            current_user: Some("default".into()),
            raw_error: None,
        };
        let cluster = store.record_probe(cluster.id, &probe).await.unwrap();
        assert_eq!(cluster.health_status, HealthState::Healthy);
        assert_eq!(cluster.latency_ms, Some(12));

        // Non-critical update keeps diagnostics.
        let cluster = store
            .update(
                cluster.id,
                ClusterUpdate {
                    name: Some("analytics-main".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cluster.health_status, HealthState::Healthy);
        assert_eq!(cluster.server_version.as_deref(), Some("24.3.1"));

        // Critical update resets everything.
        let cluster = store
            .update(
                cluster.id,
                ClusterUpdate {
                    host: Some("ch2.internal".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cluster.health_status, HealthState::NeverTested);
        assert!(cluster.last_tested_at.is_none());
        assert!(cluster.latency_ms.is_none());
        assert!(cluster.server_version.is_none());
        assert!(cluster.detected_current_user.is_none());
        assert!(cluster.error_code.is_none());
        assert!(cluster.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failed_probe_records_error() {
        let store = setup().await;
        let cluster = store.create(sample()).await.unwrap();
        let probe = ConnectionTestResult {
            ok: false,
            error_code: Some("CONNECTION_REFUSED".into()),
            message: "Connection refused".into(),
            suggestions: vec![],
            latency_ms: None,
            server_version: None,
            current_user: None,
            raw_error: Some("connect ECONNREFUSED".into()),
        };
        let cluster = store.record_probe(cluster.id, &probe).await.unwrap();
        assert_eq!(cluster.health_status, HealthState::Failed);
        assert_eq!(cluster.error_code.as_deref(), Some("CONNECTION_REFUSED"));
        assert_eq!(cluster.error_message.as_deref(), Some("Connection refused"));
    }
}
