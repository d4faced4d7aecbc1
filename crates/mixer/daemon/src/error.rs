//! Error types for mixer-daemon

use mixer_types::MixerError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed roster or event script
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be rendered
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Runtime rejected an operation
    #[error("Runtime error: {0}")]
    Runtime(#[from] MixerError),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
