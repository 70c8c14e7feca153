//! Configuration loading: defaults, file, environment.

use crate::error::ConfigError;
use crate::settings::{GatewayConfig, LogFormat};
use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Load configuration from the file named by `GATEWAY_CONFIG` (if any),
/// then apply `GATEWAY_*` environment overrides.
///
/// # Errors
/// Returns error if the file cannot be read or parsed, an override is
/// malformed, or the result fails validation
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => read_file(Path::new(&path)).await?,
        _ => {
            debug!("No config file specified, using defaults");
            GatewayConfig::default()
        }
    };

    config.apply_env_overrides(|var| std::env::var(var).ok())?;
    config.check()?;
    Ok(config)
}

/// Load and validate configuration from a specific file (no env overrides)
///
/// # Errors
/// Returns error if the file cannot be read, parsed, or validated
pub async fn load_config_from_path(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let config = read_file(path.as_ref()).await?;
    config.check()?;
    Ok(config)
}

async fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let config = parse(path, &contents)?;
    info!(path = %path.display(), "Configuration file loaded");
    Ok(config)
}

fn parse(path: &Path, contents: &str) -> Result<GatewayConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Some("toml") => toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

impl GatewayConfig {
    /// Apply `GATEWAY_*` overrides using the given variable lookup
    ///
    /// # Errors
    /// Returns error if a variable holds a malformed value
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GATEWAY_PORT") {
            self.server.port = parse_var("GATEWAY_PORT", &port)?;
        }
        if let Some(max) = lookup("GATEWAY_RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = parse_var("GATEWAY_RATE_LIMIT_MAX_REQUESTS", &max)?;
        }
        if let Some(window) = lookup("GATEWAY_RATE_LIMIT_WINDOW_MS") {
            let ms: u64 = parse_var("GATEWAY_RATE_LIMIT_WINDOW_MS", &window)?;
            self.rate_limit.window = Duration::from_millis(ms);
        }
        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" => LogFormat::Text,
                other => {
                    return Err(ConfigError::Env {
                        var: "GATEWAY_LOG_FORMAT".to_string(),
                        message: format!("unknown format '{other}'"),
                    })
                }
            };
        }
        if let Some(keys) = lookup("GATEWAY_API_KEYS") {
            self.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| SecretString::new(k.to_string()))
                .collect();
        }
        Ok(())
    }
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: e.to_string(),
    })
}
