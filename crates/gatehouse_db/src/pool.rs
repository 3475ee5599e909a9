//! Database pool creation.

use tracing::info;

use crate::error::Result;

/// Database pool type alias.
pub type DbPool = sqlx::SqlitePool;

/// Database row type for queries.
pub type DbRow = sqlx::sqlite::SqliteRow;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// Create a file-backed SQLite configuration.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// Create an in-memory SQLite configuration (for testing).
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Create configuration from a URL as-is.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
        }
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Create a database pool and apply SQLite pragmas.
pub async fn create_pool(config: DbConfig) -> Result<DbPool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    apply_sqlite_pragmas(&pool).await?;
    info!("Connected to database at {}", config.url);
    Ok(pool)
}

/// WAL for concurrent readers, NORMAL sync, and enforced foreign keys.
async fn apply_sqlite_pragmas(pool: &DbPool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}
