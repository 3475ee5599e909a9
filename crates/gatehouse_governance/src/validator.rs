//! Connection validation and failure classification.
//!
//! The probe runs `SELECT 1`, measures wall-clock latency, then fetches the
//! server version and current user best-effort. Failures never cross the
//! HTTP boundary as errors - they are classified into an operator-facing
//! [`ConnectionTestResult`] with actionable suggestions.

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::clickhouse::{ClickHouseClient, ClusterError};

/// Structured outcome of a connection probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResult {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub suggestions: Vec<String>,
    pub latency_ms: Option<i64>,
    pub server_version: Option<String>,
    pub current_user: Option<String>,
    pub raw_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    DnsError,
    ConnectionRefused,
    Timeout,
    TlsError,
    AuthFailed,
    PermissionDenied,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DnsError => "DNS_ERROR",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::Timeout => "TIMEOUT",
            Self::TlsError => "TLS_ERROR",
            Self::AuthFailed => "AUTH_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Ordered classification rules. The first rule whose needle appears in the
/// lowercased error text wins; HTTP 401/403 short-circuits to AUTH_FAILED
/// at its position in the order.
const MESSAGE_RULES: &[(ErrorCode, &[&str])] = &[
    (
        ErrorCode::DnsError,
        &[
            "name or service not known",
            "nodename nor servname",
            "getaddrinfo failed",
            "no address associated",
            "failed to lookup address",
            "dns error",
        ],
    ),
    (
        ErrorCode::ConnectionRefused,
        &["connection refused", "connect call failed"],
    ),
    (ErrorCode::Timeout, &["timed out", "timeout"]),
    (ErrorCode::TlsError, &["ssl", "tls", "certificate", "handshake"]),
    (
        ErrorCode::AuthFailed,
        &["authentication", "wrong password", "incorrect user"],
    ),
    (
        ErrorCode::PermissionDenied,
        &["access denied", "not enough privileges"],
    ),
];

/// Classify a probe failure from its HTTP status (when one exists) and the
/// error or body text.
pub fn classify_error(status: Option<u16>, text: &str) -> ErrorCode {
    let lower = text.to_lowercase();
    for (code, needles) in MESSAGE_RULES {
        if *code == ErrorCode::AuthFailed && matches!(status, Some(401) | Some(403)) {
            return ErrorCode::AuthFailed;
        }
        if needles.iter().any(|needle| lower.contains(needle)) {
            return *code;
        }
    }
    if matches!(status, Some(401) | Some(403)) {
        return ErrorCode::AuthFailed;
    }
    ErrorCode::Unknown
}

/// Operator-actionable suggestions per failure class.
pub fn suggestions_for(code: ErrorCode) -> Vec<String> {
    let items: &[&str] = match code {
        ErrorCode::DnsError => &[
            "Check the hostname for typos",
            "Verify the host is resolvable from the governance server (not your browser)",
        ],
        ErrorCode::ConnectionRefused => &[
            "Verify the port (HTTP interface is usually 8123, native is 9000)",
            "Check that the server is running and listening on this interface",
            "Check firewall rules between the governance server and the cluster",
        ],
        ErrorCode::Timeout => &[
            "Check network connectivity and latency to the host",
            "Verify a firewall is not silently dropping packets",
            "Increase the server-side timeout if the cluster is under heavy load",
        ],
        ErrorCode::TlsError => &[
            "Verify the protocol: https against a plain-HTTP port fails the handshake",
            "Check the certificate is valid for this hostname and not expired",
        ],
        ErrorCode::AuthFailed => &[
            "Verify the username and password",
            "Check the user exists on the cluster and allows connections from this host",
        ],
        ErrorCode::PermissionDenied => &[
            "The account connected but lacks privileges; grant it access to system tables",
        ],
        ErrorCode::Unknown => &[
            "Inspect the raw error for details",
            "Verify host, port, and protocol together describe the HTTP interface",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Probe a cluster: `SELECT 1` with latency measurement, then best-effort
/// version and current-user lookups (their failures are tolerated).
pub async fn probe(client: &ClickHouseClient) -> ConnectionTestResult {
    let started = Instant::now();
    match client.execute("SELECT 1").await {
        Ok(_) => {
            let latency_ms = started.elapsed().as_millis() as i64;
            let server_version = client.server_version().await.ok();
            let current_user = client.current_user().await.ok();
            ConnectionTestResult {
                ok: true,
                error_code: None,
                message: "Connection successful".to_string(),
                suggestions: Vec::new(),
                latency_ms: Some(latency_ms),
                server_version,
                current_user,
                raw_error: None,
            }
        }
        Err(err) => failure_result(&err),
    }
}

fn failure_result(err: &ClusterError) -> ConnectionTestResult {
    let detail = err.detail();
    let code = classify_error(err.status_code(), &detail);
    debug!(code = code.as_str(), detail = %detail, "Connection probe failed");
    ConnectionTestResult {
        ok: false,
        error_code: Some(code.as_str().to_string()),
        message: probe_message(code),
        suggestions: suggestions_for(code),
        latency_ms: None,
        server_version: None,
        current_user: None,
        raw_error: Some(detail),
    }
}

fn probe_message(code: ErrorCode) -> String {
    match code {
        ErrorCode::DnsError => "Hostname could not be resolved",
        ErrorCode::ConnectionRefused => "Connection refused by the host",
        ErrorCode::Timeout => "Connection timed out",
        ErrorCode::TlsError => "TLS negotiation failed",
        ErrorCode::AuthFailed => "Authentication failed",
        ErrorCode::PermissionDenied => "Connected, but the account lacks privileges",
        ErrorCode::Unknown => "Connection failed",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dns() {
        assert_eq!(
            classify_error(None, "failed to lookup address information: Name or service not known"),
            ErrorCode::DnsError
        );
        assert_eq!(
            classify_error(None, "getaddrinfo failed"),
            ErrorCode::DnsError
        );
    }

    #[test]
    fn test_classify_refused_and_timeout() {
        assert_eq!(
            classify_error(None, "tcp connect error: Connection refused (os error 111)"),
            ErrorCode::ConnectionRefused
        );
        assert_eq!(
            classify_error(None, "operation timed out"),
            ErrorCode::Timeout
        );
    }

    #[test]
    fn test_classify_tls() {
        assert_eq!(
            classify_error(None, "invalid peer certificate: Expired"),
            ErrorCode::TlsError
        );
        assert_eq!(
            classify_error(None, "received corrupt TLS message"),
            ErrorCode::TlsError
        );
    }

    #[test]
    fn test_classify_auth_by_status_and_message() {
        assert_eq!(classify_error(Some(401), "whatever"), ErrorCode::AuthFailed);
        assert_eq!(classify_error(Some(403), ""), ErrorCode::AuthFailed);
        assert_eq!(
            classify_error(Some(500), "Code: 516. Authentication failed: wrong password"),
            ErrorCode::AuthFailed
        );
    }

    #[test]
    fn test_classify_permission_denied() {
        assert_eq!(
            classify_error(Some(500), "Code: 497. Not enough privileges"),
            ErrorCode::PermissionDenied
        );
    }

    #[test]
    fn test_classify_order_dns_beats_timeout() {
        // A DNS failure that also mentions a timeout classifies as DNS.
        assert_eq!(
            classify_error(None, "getaddrinfo failed after timeout"),
            ErrorCode::DnsError
        );
    }

    #[test]
    fn test_classify_unknown_fallback() {
        assert_eq!(classify_error(None, "mystery"), ErrorCode::Unknown);
        assert_eq!(classify_error(Some(500), "mystery"), ErrorCode::Unknown);
    }

    #[test]
    fn test_every_code_has_suggestions() {
        for code in [
            ErrorCode::DnsError,
            ErrorCode::ConnectionRefused,
            ErrorCode::Timeout,
            ErrorCode::TlsError,
            ErrorCode::AuthFailed,
            ErrorCode::PermissionDenied,
            ErrorCode::Unknown,
        ] {
            assert!(!suggestions_for(code).is_empty(), "{:?}", code);
        }
    }
}
