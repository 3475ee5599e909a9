//! Executor service configuration.

use clap::Parser;
use gatehouse_protocol::defaults::DEFAULT_EXECUTOR_BIND_ADDR;

#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse-executor", about = "Gatehouse RBAC job executor")]
pub struct ExecutorConfig {
    /// HTTP bind address
    #[arg(long, env = "GATEHOUSE_EXECUTOR_BIND", default_value = DEFAULT_EXECUTOR_BIND_ADDR)]
    pub bind: String,

    /// Database connection URL
    #[arg(
        long,
        env = "GATEHOUSE_EXECUTOR_DATABASE_URL",
        default_value = "sqlite:gatehouse_executor.db?mode=rwc"
    )]
    pub database_url: String,

    /// 32-hex-char AES-128-GCM key shared with the governance service
    #[arg(long, env = "GATEHOUSE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: String,

    /// Shared key required on every request
    #[arg(long, env = "GATEHOUSE_INTERNAL_API_KEY", hide_env_values = true)]
    pub internal_api_key: String,
}
