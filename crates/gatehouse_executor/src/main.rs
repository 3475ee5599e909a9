//! Gatehouse Executor
//!
//! Usage:
//!     gatehouse-executor --bind 127.0.0.1:8090 --database-url sqlite:executor.db?mode=rwc

use std::sync::Arc;

use clap::Parser;
use gatehouse_db::{create_pool, DbConfig};
use gatehouse_executor::db::{schema, JobStore};
use gatehouse_executor::routes::{self, AppState};
use gatehouse_executor::{ExecutorConfig, Pipeline};
use gatehouse_security::SecretBox;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse_executor=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ExecutorConfig::parse();
    tracing::info!("Starting Gatehouse executor on {}", config.bind);

    let secrets = SecretBox::from_hex_key(&config.encryption_key)?;
    let pool = create_pool(DbConfig::from_url(&config.database_url)).await?;
    schema::ensure_schema(&pool).await?;

    let store = JobStore::new(pool);
    let state = AppState {
        pipeline: Arc::new(Pipeline::new(store, secrets)),
        internal_api_key: Arc::new(config.internal_api_key),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
