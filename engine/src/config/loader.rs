use crate::config::error::{ConfigError, Result};
use crate::retry::{BreakerPolicy, RetryPolicy};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default retry policy for calls that don't pass their own
    #[serde(default)]
    pub retry: RetryConfig,

    /// Degraded-mode controller settings
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// HTTP client settings
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Retry configuration for outbound calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-attempt deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive exhausted calls before degraded mode
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time spent in degraded mode, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Count 4xx (other than 401/429) toward the threshold
    #[serde(default)]
    pub count_client_errors: bool,
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Header carrying the per-call correlation id (empty disables it)
    #[serde(default = "default_request_id_header")]
    pub request_id_header: Option<String>,

    /// TCP connect timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

// Default value functions
fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_cooldown_ms() -> u64 {
    10_000
}
fn default_user_agent() -> String {
    format!("backstop/{}", env!("CARGO_PKG_VERSION"))
}
fn default_request_id_header() -> Option<String> {
    Some("X-Request-Id".to_string())
}

// Default implementations
impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            count_client_errors: false,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_id_header: default_request_id_header(),
            connect_timeout_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            timeout_per_attempt: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl BreakerConfig {
    pub fn to_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            threshold: self.failure_threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
            count_client_errors: self.count_client_errors,
        }
    }
}

impl EngineConfig {
    /// Check cross-field invariants the serde layer can't express.
    pub fn validate(&self) -> Result<()> {
        self.retry
            .to_policy()
            .validate()
            .map_err(ConfigError::Invalid)?;
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (BACKSTOP_ prefix)
    pub fn load(&self) -> Result<EngineConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&EngineConfig::default())?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::NotFound(path.clone()));
            }
        }

        // Example: BACKSTOP_RETRY__MAX_ATTEMPTS=5
        builder = builder.add_source(
            Environment::with_prefix("BACKSTOP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let engine_config: EngineConfig = builder.build()?.try_deserialize()?;
        engine_config.validate()?;

        tracing::debug!(
            file = ?self.config_path,
            max_attempts = engine_config.retry.max_attempts,
            failure_threshold = engine_config.breaker.failure_threshold,
            "Engine configuration loaded"
        );
        Ok(engine_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./backstop.toml
    /// 2. XDG config: ~/.config/backstop/config.toml
    /// 3. Home directory: ~/.backstop.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./backstop.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("backstop").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".backstop.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<EngineConfig> {
        let loader = if let Some(config_path) = Self::find_config_file() {
            ConfigLoader::new().with_file(config_path)
        } else {
            ConfigLoader::new()
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file")
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.retry.timeout_ms, 10_000);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.cooldown_ms, 10_000);
        assert!(!config.breaker.count_client_errors);
        assert_eq!(
            config.transport.request_id_header.as_deref(),
            Some("X-Request-Id")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_to_policy() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.timeout_per_attempt, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_load_with_defaults_only() {
        let config = ConfigLoader::new().load().expect("default config loads");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = toml_file();
        writeln!(
            file,
            "[retry]\nmax_attempts = 2\nbase_delay_ms = 100\n\n[breaker]\ncooldown_ms = 500\ncount_client_errors = true"
        )
        .expect("write config");

        let config = ConfigLoader::new()
            .with_file(file.path())
            .load()
            .expect("config loads");

        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 100);
        // Untouched keys keep their defaults
        assert_eq!(config.retry.max_delay_ms, 10_000);
        assert_eq!(config.breaker.cooldown_ms, 500);
        assert!(config.breaker.count_client_errors);
    }

    #[test]
    #[serial]
    fn test_load_with_env_override() {
        unsafe {
            env::set_var("BACKSTOP_RETRY__MAX_ATTEMPTS", "7");
            env::set_var("BACKSTOP_BREAKER__FAILURE_THRESHOLD", "1");
        }

        let result = ConfigLoader::new().load();

        unsafe {
            env::remove_var("BACKSTOP_RETRY__MAX_ATTEMPTS");
            env::remove_var("BACKSTOP_BREAKER__FAILURE_THRESHOLD");
        }

        let config = result.expect("config loads");
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.breaker.failure_threshold, 1);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/backstop.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        let mut file = toml_file();
        writeln!(file, "[retry]\nmax_attempts = 0").expect("write config");

        let result = ConfigLoader::new().with_file(file.path()).load();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_delay_ordering() {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 20_000;
        let err = config.validate().expect_err("base above cap");
        assert!(err.to_string().contains("base_delay"));
    }

    #[test]
    fn test_validate_threshold() {
        let mut config = EngineConfig::default();
        config.breaker.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }
}
