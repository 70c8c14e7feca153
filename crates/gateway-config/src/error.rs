//! Configuration errors.

use std::path::PathBuf;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Unsupported file extension
    #[error("Unsupported config format for {0} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(PathBuf),

    /// Environment override has an invalid value
    #[error("Invalid value for {var}: {message}")]
    Env {
        /// Variable name
        var: String,
        /// Problem description
        message: String,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
