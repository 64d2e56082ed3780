//! Configuration module for the request engine
//!
//! Implements layered configuration with the 12-factor app pattern:
//! 1. Defaults (from code)
//! 2. Config file (backstop.toml)
//! 3. Environment variables (BACKSTOP_* prefix)
//!
//! # Example
//!
//! ```no_run
//! use backstop_engine::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_file("./backstop.toml")
//!     .load()?;
//! let policy = config.retry.to_policy();
//! # Ok::<(), backstop_engine::config::ConfigError>(())
//! ```

pub mod error;
pub mod loader;

// Re-export main types
pub use error::{ConfigError, Result};
pub use loader::{BreakerConfig, ConfigLoader, EngineConfig, RetryConfig, TransportConfig};
