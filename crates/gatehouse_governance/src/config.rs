//! Governance service configuration.

use clap::Parser;
use gatehouse_protocol::defaults::DEFAULT_GOVERNANCE_BIND_ADDR;

#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse-governance", about = "Gatehouse RBAC governance control plane")]
pub struct GovernanceConfig {
    /// HTTP bind address
    #[arg(long, env = "GATEHOUSE_GOVERNANCE_BIND", default_value = DEFAULT_GOVERNANCE_BIND_ADDR)]
    pub bind: String,

    /// Database connection URL
    #[arg(
        long,
        env = "GATEHOUSE_GOVERNANCE_DATABASE_URL",
        default_value = "sqlite:gatehouse_governance.db?mode=rwc"
    )]
    pub database_url: String,

    /// Base URL of the executor service
    #[arg(long, env = "GATEHOUSE_EXECUTOR_URL", default_value = "http://127.0.0.1:8090")]
    pub executor_url: String,

    /// 32-hex-char AES-128-GCM key shared with the executor service
    #[arg(long, env = "GATEHOUSE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Shared key sent on every executor request
    #[arg(long, env = "GATEHOUSE_INTERNAL_API_KEY", hide_env_values = true)]
    pub internal_api_key: String,
}
