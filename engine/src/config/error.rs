use std::path::PathBuf;
use thiserror::Error;

/// Why an [`EngineConfig`](super::EngineConfig) could not be produced
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// A layer (file or environment) failed to parse or deserialize
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("failed to serialize built-in defaults: {0}")]
    Defaults(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
