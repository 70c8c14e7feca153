//! Structured logging setup.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset
    pub level: String,
    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Switch to JSON output
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Build the filter, preferring `RUST_LOG` over the configured level
    ///
    /// # Errors
    /// Returns error if the configured level is not a valid directive
    pub fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| LoggingError::Filter(format!("'{}': {e}", self.level))),
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if the filter is invalid or a subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = config.filter()?;

    let layer = if config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Invalid filter directive
    #[error("Invalid log filter {0}")]
    Filter(String),
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}
