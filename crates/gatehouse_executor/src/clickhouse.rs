//! Statement execution against the target cluster's HTTP interface.

use std::time::Duration;

use gatehouse_protocol::defaults::STEP_TIMEOUT_SECS;
use thiserror::Error;

/// How much of a failing response body is kept as the step message.
const ERROR_BODY_LIMIT: usize = 500;

/// Decrypted connection target for one job. Lives in memory only.
#[derive(Debug, Clone)]
pub struct ClusterEndpoint {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub username: String,
    pub password: String,
}

impl ClusterEndpoint {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// A failed statement. Both variants carry an operator-facing message that
/// is already truncated to a loggable size.
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("{0}")]
    ClusterRejected(String),

    #[error("{0}")]
    Transport(String),
}

impl StatementError {
    pub fn message(&self) -> &str {
        match self {
            Self::ClusterRejected(m) | Self::Transport(m) => m,
        }
    }
}

/// POST one DDL statement; credentials travel as query parameters, the
/// statement as the body. Returns the trimmed response text.
pub async fn execute_statement(
    client: &reqwest::Client,
    endpoint: &ClusterEndpoint,
    sql: &str,
) -> Result<String, StatementError> {
    let response = client
        .post(endpoint.base_url())
        .query(&[
            ("user", endpoint.username.as_str()),
            ("password", endpoint.password.as_str()),
        ])
        .timeout(Duration::from_secs(STEP_TIMEOUT_SECS))
        .body(sql.to_string())
        .send()
        .await
        .map_err(|e| StatementError::Transport(truncate(&e.to_string())))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StatementError::Transport(truncate(&e.to_string())))?;

    if !status.is_success() {
        return Err(StatementError::ClusterRejected(truncate(&body)));
    }
    Ok(body.trim().to_string())
}

fn truncate(message: &str) -> String {
    if message.len() <= ERROR_BODY_LIMIT {
        return message.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let ep = ClusterEndpoint {
            host: "ch.internal".into(),
            port: 8443,
            protocol: "https".into(),
            username: "default".into(),
            password: "".into(),
        };
        assert_eq!(ep.base_url(), "https://ch.internal:8443");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "x".repeat(600);
        assert_eq!(truncate(&long).len(), 500);

        let multibyte = "é".repeat(300); // 600 bytes
        let cut = truncate(&multibyte);
        assert!(cut.len() <= 500);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
