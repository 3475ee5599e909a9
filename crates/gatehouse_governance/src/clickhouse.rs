//! Thin async wrapper around the cluster's HTTP query interface.
//!
//! Queries travel as GET parameters with the credentials; row data comes
//! back as `JSONEachRow` (one JSON object per line). The plaintext password
//! lives only inside this client, decrypted at construction for the
//! duration of one request handler.

use std::time::Duration;

use gatehouse_protocol::defaults::PROBE_TIMEOUT_SECS;
use gatehouse_security::{CryptoError, SecretBox};
use serde_json::Value;
use thiserror::Error;

use crate::db::models::Cluster;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// The request never produced an HTTP response.
    #[error("{0}")]
    Transport(String),

    /// The cluster answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed row from cluster: {0}")]
    BadRow(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The text the classifier inspects: body for HTTP errors, the
    /// transport error chain otherwise.
    pub fn detail(&self) -> String {
        match self {
            Self::Transport(m) => m.clone(),
            Self::Status { body, .. } => body.clone(),
            Self::BadRow(e) => e.to_string(),
        }
    }
}

pub struct ClickHouseClient {
    base_url: String,
    username: String,
    password: String,
    database: Option<String>,
    http: reqwest::Client,
    timeout: Duration,
}

impl ClickHouseClient {
    /// Build a client for a registered cluster, decrypting its credential.
    pub fn for_cluster(cluster: &Cluster, secrets: &SecretBox) -> Result<Self, CryptoError> {
        let password = secrets.decrypt(&cluster.password_encrypted)?;
        Ok(Self::new(
            &cluster.host,
            cluster.port as u16,
            &cluster.protocol,
            &cluster.username,
            password,
            cluster.default_database.clone(),
        ))
    }

    /// Build a client from unsaved connection details (validation flow).
    pub fn new(
        host: &str,
        port: u16,
        protocol: &str,
        username: &str,
        password: String,
        database: Option<String>,
    ) -> Self {
        Self {
            base_url: format!("{protocol}://{host}:{port}"),
            username: username.to_string(),
            password,
            database,
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECS),
        }
    }

    /// Execute a query and return the raw response text, trimmed.
    pub async fn execute(&self, query: &str) -> Result<String, ClusterError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("user", self.username.as_str()),
            ("password", self.password.as_str()),
            ("query", query),
        ];
        if let Some(db) = self.database.as_deref() {
            params.push(("database", db));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClusterError::Transport(full_error_chain(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClusterError::Transport(full_error_chain(&e)))?;

        if !status.is_success() {
            return Err(ClusterError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body.trim().to_string())
    }

    /// Execute a query and parse `JSONEachRow` output into row objects.
    pub async fn execute_json(&self, query: &str) -> Result<Vec<Value>, ClusterError> {
        let raw = self.execute(&format!("{query} FORMAT JSONEachRow")).await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(ClusterError::from))
            .collect()
    }

    pub async fn server_version(&self) -> Result<String, ClusterError> {
        self.execute("SELECT version()").await
    }

    pub async fn current_user(&self) -> Result<String, ClusterError> {
        self.execute("SELECT currentUser()").await
    }

    // ── schema browsing ─────────────────────────────────────────────────

    pub async fn databases(&self) -> Result<Vec<String>, ClusterError> {
        let raw = self.execute("SHOW DATABASES").await?;
        Ok(raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }

    pub async fn tables(&self, database: &str) -> Result<Vec<Value>, ClusterError> {
        self.execute_json(&format!(
            "SELECT name, engine, total_rows, total_bytes FROM system.tables \
             WHERE database = '{}'",
            escape_literal(database)
        ))
        .await
    }

    pub async fn columns(&self, database: &str, table: &str) -> Result<Vec<Value>, ClusterError> {
        self.execute_json(&format!(
            "SELECT name, type FROM system.columns WHERE database = '{}' AND table = '{}'",
            escape_literal(database),
            escape_literal(table)
        ))
        .await
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// reqwest errors wrap the interesting part (DNS failure, refused
/// connection) in their source chain; the classifier needs all of it.
fn full_error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
