//! Gatehouse Governance
//!
//! Usage:
//!     gatehouse-governance --bind 127.0.0.1:8080 --executor-url http://127.0.0.1:8090

use clap::Parser;
use gatehouse_db::{create_pool, DbConfig};
use gatehouse_governance::db::{schema, ClusterStore, HistoryStore, ProposalStore, SnapshotStore};
use gatehouse_governance::executor_client::ExecutorClient;
use gatehouse_governance::routes::{self, AppState};
use gatehouse_governance::GovernanceConfig;
use gatehouse_security::SecretBox;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_governance=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GovernanceConfig::parse();
    tracing::info!("Starting Gatehouse governance on {}", config.bind);
    tracing::info!("  Executor: {}", config.executor_url);

    let secrets = SecretBox::from_hex_key(&config.encryption_key)?;
    let pool = create_pool(DbConfig::from_url(&config.database_url)).await?;
    schema::ensure_schema(&pool).await?;

    let state = AppState {
        clusters: ClusterStore::new(pool.clone()),
        proposals: ProposalStore::new(pool.clone()),
        snapshots: SnapshotStore::new(pool.clone()),
        history: HistoryStore::new(pool),
        secrets,
        executor: ExecutorClient::new(config.executor_url, config.internal_api_key),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
