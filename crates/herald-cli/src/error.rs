//! Error handling for the Herald CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Herald error: {0}")]
    Herald(#[from] herald_core::errors::HeraldError),

    #[error("Session store error: {0}")]
    Store(#[from] herald_core::errors::StoreError),

    #[error("Event cache error: {0}")]
    Cache(#[from] herald_core::errors::CacheError),

    #[error("Control surface error: {0}")]
    Control(#[from] herald_core::errors::ControlError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Instance setup error: {0}")]
    Setup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        CliError::Config(err.to_string())
    }
}
