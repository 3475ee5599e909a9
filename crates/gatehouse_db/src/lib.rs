//! Database layer shared by the governance and executor services.
//!
//! Both services use SQLite through concrete `SqlitePool`s, which keeps
//! `#[derive(FromRow)]` working with enums and `DateTime<Utc>` columns.
//! Sessions are request-local: stores borrow the pool per call and never
//! hold a connection across a cluster or executor round-trip.

pub mod error;
pub mod pool;

pub use error::{DbError, Result};
pub use pool::{create_pool, DbConfig, DbPool, DbRow};
