//! `backstop` command-line adapter
//!
//! Thin front end over [`backstop_engine::RequestExecutor`]. Commands
//! resolve configuration at the edge, run one or more calls, print the
//! outcome, and map it onto a process exit code.
//!
//! ## Exit Codes
//!
//! - 0: Success
//! - 1: Request failed (classified error, retries exhausted, cancelled)
//! - 2: Rejected because the client is in degraded mode
//! - 3: Configuration or infrastructure error

pub mod fetch_cmd;
pub mod simulate_cmd;

use backstop_engine::config::RetryConfig;
use backstop_engine::{ConfigLoader, EngineConfig, ErrorInfo, RetryPolicy};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use fetch_cmd::{FetchArgs, HealthArgs};
pub use simulate_cmd::SimulateArgs;

pub const EXIT_OK: i32 = 0;
pub const EXIT_REQUEST_FAILED: i32 = 1;
pub const EXIT_DEGRADED: i32 = 2;
pub const EXIT_INFRA: i32 = 3;

/// Resilient HTTP client with retry, backoff and a circuit breaker
#[derive(Debug, Parser)]
#[command(name = "backstop", version)]
pub struct BackstopCli {
    /// Configuration file (defaults to ./backstop.toml, then the user config dir)
    #[arg(long = "config", short = 'c', value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: BackstopSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum BackstopSubcommand {
    /// Execute one request with retries
    Fetch(FetchArgs),

    /// Single-attempt probe that bypasses the circuit breaker
    Health(HealthArgs),

    /// Replay a scripted sequence of outcomes through the engine
    Simulate(SimulateArgs),
}

/// Per-invocation overrides for the configured retry policy
#[derive(Debug, Default, Clone, Args)]
pub struct RetryOverrides {
    /// Total attempts including the first one
    #[arg(long = "max-attempts", value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Backoff base delay in milliseconds
    #[arg(long = "base-delay-ms", value_name = "MS")]
    pub base_delay_ms: Option<u64>,

    /// Backoff cap in milliseconds
    #[arg(long = "max-delay-ms", value_name = "MS")]
    pub max_delay_ms: Option<u64>,

    /// Per-attempt deadline in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

impl RetryOverrides {
    pub fn apply(&self, base: &RetryConfig) -> anyhow::Result<RetryPolicy> {
        let merged = RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
        };
        let policy = merged.to_policy();
        policy
            .validate()
            .map_err(|reason| anyhow::anyhow!("invalid retry settings: {reason}"))?;
        Ok(policy)
    }
}

impl BackstopCli {
    /// Run the selected command and return the process exit code.
    pub async fn run(self) -> anyhow::Result<i32> {
        let config = load_config(self.config.as_ref())?;
        match self.command {
            BackstopSubcommand::Fetch(args) => fetch_cmd::run_fetch(&config, args).await,
            BackstopSubcommand::Health(args) => fetch_cmd::run_health(&config, args).await,
            BackstopSubcommand::Simulate(args) => simulate_cmd::run_simulate(&config, args).await,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => ConfigLoader::new().with_file(path).load()?,
        None => ConfigLoader::load_default()?,
    };
    Ok(config)
}

/// Map an engine error onto the CLI exit code.
pub fn exit_code_for(err: &ErrorInfo) -> i32 {
    if err.is_degraded() {
        EXIT_DEGRADED
    } else {
        EXIT_REQUEST_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = RetryOverrides {
            max_attempts: Some(2),
            timeout_ms: Some(250),
            ..Default::default()
        };
        let policy = overrides
            .apply(&RetryConfig::default())
            .expect("valid overrides");
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.timeout_per_attempt, Duration::from_millis(250));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let overrides = RetryOverrides {
            base_delay_ms: Some(5_000),
            max_delay_ms: Some(100),
            ..Default::default()
        };
        let err = overrides
            .apply(&RetryConfig::default())
            .expect_err("base above cap");
        assert!(err.to_string().contains("base_delay"));
    }

    #[test]
    fn degraded_maps_to_its_own_exit_code() {
        assert_eq!(exit_code_for(&ErrorInfo::degraded()), EXIT_DEGRADED);
        assert_eq!(exit_code_for(&ErrorInfo::cancelled(1)), EXIT_REQUEST_FAILED);
    }

    #[test]
    fn parses_global_config_flag_after_subcommand() {
        let cli = BackstopCli::try_parse_from([
            "backstop",
            "fetch",
            "http://localhost/",
            "--config",
            "custom.toml",
        ])
        .expect("valid arguments");
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, BackstopSubcommand::Fetch(_)));
    }
}
