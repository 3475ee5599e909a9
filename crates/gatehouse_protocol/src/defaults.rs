//! Canonical default values shared across both services.

pub const DEFAULT_GOVERNANCE_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_EXECUTOR_BIND_ADDR: &str = "127.0.0.1:8090";
pub const DEFAULT_CLICKHOUSE_PORT: u16 = 8123;

/// Connection probe timeout (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 15;
/// Per-statement timeout for executor steps (seconds).
pub const STEP_TIMEOUT_SECS: u64 = 30;
/// Governance -> executor RPC timeout (seconds).
pub const EXECUTOR_CALL_TIMEOUT_SECS: u64 = 60;

/// Header carrying the shared service-to-service key.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";
/// Headers carrying the authenticated operator principal.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
