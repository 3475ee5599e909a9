//! Proposal persistence and lifecycle transitions.
//!
//! Every status transition is a compare-and-swap on the status column, so
//! two operators racing to approve or execute the same proposal cannot both
//! win - the loser sees the row in its new state and gets the
//! invalid-state error.

use chrono::Utc;
use gatehouse_db::{DbError, DbPool, Result};
use gatehouse_protocol::{ProposalKind, ProposalStatus};
use tracing::info;

use super::models::{Proposal, ProposalOperation, ProposalReview};

#[derive(Debug, Clone)]
pub struct NewProposal {
    pub cluster_id: i64,
    pub created_by: i64,
    pub kind: ProposalKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub is_elevated: bool,
    pub sql_preview: Option<String>,
    pub compensation_sql: Option<String>,
    pub db_name: Option<String>,
    pub table_name: Option<String>,
    pub target_type: Option<String>,
    pub target_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOperation {
    pub order_index: i64,
    pub operation_type: String,
    pub params: String,
    pub sql_preview: Option<String>,
    pub compensation_sql: Option<String>,
}

#[derive(Clone)]
pub struct ProposalStore {
    pool: DbPool,
}

impl ProposalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a proposal and its ordered operations in one transaction.
    /// Operations are immutable after this point.
    pub async fn create(&self, new: NewProposal, operations: Vec<NewOperation>) -> Result<Proposal> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let proposal_id = sqlx::query(
            r#"
            INSERT INTO proposals
                (cluster_id, created_by, status, kind, title, description, reason,
                 is_elevated, sql_preview, compensation_sql,
                 db_name, table_name, target_type, target_name,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.cluster_id)
        .bind(new.created_by)
        .bind(ProposalStatus::Submitted)
        .bind(new.kind)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.reason)
        .bind(new.is_elevated)
        .bind(&new.sql_preview)
        .bind(&new.compensation_sql)
        .bind(&new.db_name)
        .bind(&new.table_name)
        .bind(&new.target_type)
        .bind(&new.target_name)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for op in &operations {
            sqlx::query(
                r#"
                INSERT INTO proposal_operations
                    (proposal_id, order_index, operation_type, params,
                     sql_preview, compensation_sql, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(proposal_id)
            .bind(op.order_index)
            .bind(&op.operation_type)
            .bind(&op.params)
            .bind(&op.sql_preview)
            .bind(&op.compensation_sql)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(proposal_id, operations = operations.len(), "Proposal created");
        self.get(proposal_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Proposal> {
        sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("proposal {id}")))
    }

    pub async fn list(&self) -> Result<Vec<Proposal>> {
        let proposals =
            sqlx::query_as::<_, Proposal>("SELECT * FROM proposals ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(proposals)
    }

    pub async fn operations_for(&self, proposal_id: i64) -> Result<Vec<ProposalOperation>> {
        let operations = sqlx::query_as::<_, ProposalOperation>(
            "SELECT * FROM proposal_operations WHERE proposal_id = ? ORDER BY order_index",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(operations)
    }

    /// Compare-and-swap the status. Returns false when the proposal was not
    /// in `from` (another request won the race or the state never matched).
    pub async fn cas_status(
        &self,
        id: i64,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected =
            sqlx::query("UPDATE proposals SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to)
                .bind(&now)
                .bind(id)
                .bind(from)
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(affected > 0)
    }

    /// Claim an approved proposal for execution: approved -> executing,
    /// recording who pulled the trigger.
    pub async fn claim_for_execution(&self, id: i64, executed_by: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            r#"
            UPDATE proposals
            SET status = ?, executed_by = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(ProposalStatus::Executing)
        .bind(executed_by)
        .bind(&now)
        .bind(id)
        .bind(ProposalStatus::Approved)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Record the outcome of an execution attempt.
    pub async fn record_outcome(
        &self,
        id: i64,
        status: ProposalStatus,
        job_id: Option<i64>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE proposals
            SET status = ?, job_id = COALESCE(?, job_id), executed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(job_id)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append a review decision.
    pub async fn add_review(
        &self,
        proposal_id: i64,
        reviewer_user_id: i64,
        decision: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO proposal_reviews (proposal_id, reviewer_user_id, decision, comment, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(proposal_id)
        .bind(reviewer_user_id)
        .bind(decision)
        .bind(comment)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reviews_for(&self, proposal_id: i64) -> Result<Vec<ProposalReview>> {
        let reviews = sqlx::query_as::<_, ProposalReview>(
            "SELECT * FROM proposal_reviews WHERE proposal_id = ? ORDER BY id",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};

    async fn setup() -> ProposalStore {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        ProposalStore::new(pool)
    }

    fn multi_op() -> NewProposal {
        NewProposal {
            cluster_id: 1,
            created_by: 1,
            kind: ProposalKind::MultiOperation,
            title: Some("onboard readers".into()),
            description: None,
            reason: None,
            is_elevated: false,
            sql_preview: Some("CREATE ROLE `readers`".into()),
            compensation_sql: Some("DROP ROLE IF EXISTS `readers`".into()),
            db_name: None,
            table_name: None,
            target_type: None,
            target_name: None,
        }
    }

    #[tokio::test]
    async fn test_create_with_operations() {
        let store = setup().await;
        let proposal = store
            .create(
                multi_op(),
                vec![NewOperation {
                    order_index: 0,
                    operation_type: "create_role".into(),
                    params: r#"{"role_name":"readers"}"#.into(),
                    sql_preview: Some("CREATE ROLE `readers`".into()),
                    compensation_sql: Some("DROP ROLE IF EXISTS `readers`".into()),
                }],
            )
            .await
            .unwrap();

        assert_eq!(proposal.status, ProposalStatus::Submitted);
        let ops = store.operations_for(proposal.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, "create_role");
    }

    #[tokio::test]
    async fn test_cas_only_one_winner() {
        let store = setup().await;
        let proposal = store.create(multi_op(), vec![]).await.unwrap();

        let first = store
            .cas_status(proposal.id, ProposalStatus::Submitted, ProposalStatus::Approved)
            .await
            .unwrap();
        let second = store
            .cas_status(proposal.id, ProposalStatus::Submitted, ProposalStatus::Rejected)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(
            store.get(proposal.id).await.unwrap().status,
            ProposalStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_claim_for_execution_requires_approved() {
        let store = setup().await;
        let proposal = store.create(multi_op(), vec![]).await.unwrap();

        assert!(!store.claim_for_execution(proposal.id, 9).await.unwrap());
        store
            .cas_status(proposal.id, ProposalStatus::Submitted, ProposalStatus::Approved)
            .await
            .unwrap();
        assert!(store.claim_for_execution(proposal.id, 9).await.unwrap());

        let row = store.get(proposal.id).await.unwrap();
        assert_eq!(row.status, ProposalStatus::Executing);
        assert_eq!(row.executed_by, Some(9));

        // Second claim loses.
        assert!(!store.claim_for_execution(proposal.id, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_reviews_are_append_only() {
        let store = setup().await;
        let proposal = store.create(multi_op(), vec![]).await.unwrap();
        store
            .add_review(proposal.id, 2, "approved", Some("lgtm"))
            .await
            .unwrap();
        let reviews = store.reviews_for(proposal.id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].decision, "approved");
        assert_eq!(reviews[0].comment.as_deref(), Some("lgtm"));
    }
}
