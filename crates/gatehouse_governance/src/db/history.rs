//! Per-cluster entity history, derived from successful job steps.

use chrono::Utc;
use gatehouse_db::{DbPool, Result};

use super::models::EntityHistory;

#[derive(Clone)]
pub struct HistoryStore {
    pool: DbPool,
}

impl HistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        cluster_id: i64,
        entity_type: &str,
        entity_name: &str,
        action: &str,
        details: Option<&str>,
        proposal_id: Option<i64>,
        job_id: Option<i64>,
        actor_user_id: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO entity_history
                (cluster_id, entity_type, entity_name, action, details,
                 proposal_id, job_id, actor_user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cluster_id)
        .bind(entity_type)
        .bind(entity_name)
        .bind(action)
        .bind(details)
        .bind(proposal_id)
        .bind(job_id)
        .bind(actor_user_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// History entries for one entity, newest first. `entity_name` matches
    /// as a substring so assignments like `readers -> alice` show up when
    /// browsing either side.
    pub async fn for_entity(
        &self,
        cluster_id: i64,
        entity_type: &str,
        entity_name: &str,
        limit: i64,
    ) -> Result<Vec<EntityHistory>> {
        let pattern = format!("%{entity_name}%");
        let entries = sqlx::query_as::<_, EntityHistory>(
            r#"
            SELECT * FROM entity_history
            WHERE cluster_id = ? AND entity_type = ? AND entity_name LIKE ?
            ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(cluster_id)
        .bind(entity_type)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};

    #[tokio::test]
    async fn test_record_and_query() {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        let store = HistoryStore::new(pool);

        store
            .record(1, "role_assignment", "readers -> alice", "grant_role",
                    Some(r#"{"role_name":"readers"}"#), Some(7), Some(42), Some(3))
            .await
            .unwrap();
        store
            .record(1, "user", "alice", "create_user", None, Some(7), Some(42), Some(3))
            .await
            .unwrap();

        let entries = store.for_entity(1, "role_assignment", "readers", 100).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "grant_role");
        assert_eq!(entries[0].job_id, Some(42));

        // Substring matching finds the assignment from the grantee too.
        let entries = store.for_entity(1, "role_assignment", "alice", 100).await.unwrap();
        assert_eq!(entries.len(), 1);

        assert!(store.for_entity(2, "user", "alice", 100).await.unwrap().is_empty());
    }
}
