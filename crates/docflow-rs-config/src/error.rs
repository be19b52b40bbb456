//! Config loading and validation errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a config layer could not be loaded or accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Contents are not valid JSON5.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    /// Contents do not fit the schema, including unknown keys.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A field holds a value the memory store cannot use.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
}
