//! Configuration model.

use gateway_core::{ErrorKind, ProviderType};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Root gateway configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener
    #[validate(nested)]
    pub server: ServerSettings,
    /// Local rate limiter
    #[validate(nested)]
    pub rate_limit: RateLimitSettings,
    /// Fallback routing
    #[validate(nested)]
    pub routing: RoutingSettings,
    /// Provider adapters
    #[validate(nested)]
    pub providers: Vec<ProviderSettings>,
    /// Authentication collaborator
    pub auth: AuthSettings,
    /// Logging
    pub logging: LoggingSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            rate_limit: RateLimitSettings::default(),
            routing: RoutingSettings::default(),
            providers: ProviderSettings::defaults(),
            auth: AuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Validate field ranges and cross-field constraints
    ///
    /// # Errors
    /// Returns a validation error describing the first problem found
    pub fn check(&self) -> Result<(), crate::ConfigError> {
        self.validate()?;

        if self.rate_limit.window.is_zero() {
            return Err(crate::ConfigError::Validation(
                "rate_limit.window must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.retention < self.rate_limit.window {
            return Err(crate::ConfigError::Validation(
                "rate_limit.retention must not be shorter than rate_limit.window".to_string(),
            ));
        }
        if self.routing.request_timeout.is_zero() || self.routing.stream_timeout.is_zero() {
            return Err(crate::ConfigError::Validation(
                "routing timeouts must be greater than zero".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(crate::ConfigError::Validation(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }

        Ok(())
    }

    /// Enabled providers, lowest priority rank first
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&ProviderSettings> {
        let mut providers: Vec<&ProviderSettings> =
            self.providers.iter().filter(|p| p.enabled).collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Time allowed for in-flight requests on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Sliding-window rate limiter settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Whether the limiter is applied
    pub enabled: bool,
    /// Requests admitted per window
    #[validate(range(min = 1))]
    pub max_requests: u32,
    /// Window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Clients idle for longer than this are forgotten by the sweeper
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// Period of the background sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// How the router reacts to a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackActionSetting {
    /// Try the next adapter and count a health failure
    Fallback,
    /// Try the next adapter without touching health
    FallbackNoPenalty,
    /// Stop the chain and surface the error
    Abort,
}

/// Fallback routing settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RoutingSettings {
    /// Per-attempt budget for non-streaming calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Budget for a streaming attempt to produce its first fragment
    #[serde(with = "humantime_serde")]
    pub stream_timeout: Duration,
    /// Longest silence tolerated between fragments
    #[serde(with = "humantime_serde")]
    pub stream_idle_timeout: Duration,
    /// Consecutive failures before an adapter is disabled
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    /// How long a disabled adapter is skipped
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Overrides of the default retry-vs-abort table
    pub policy: HashMap<ErrorKind, FallbackActionSetting>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(60),
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            policy: HashMap::new(),
        }
    }
}

/// One provider adapter
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProviderSettings {
    /// Adapter identifier
    #[validate(length(min = 1))]
    pub id: String,
    /// Provider family
    pub provider_type: ProviderType,
    /// Whether the adapter is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base priority rank (lower is tried first)
    #[serde(default)]
    pub priority: u32,
    /// Inline API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Base URL override
    #[serde(default)]
    #[validate(url)]
    pub base_url: Option<String>,
    /// Default model
    #[serde(default)]
    pub model: Option<String>,
    /// Default max tokens
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_tokens: Option<u32>,
    /// Default temperature
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: Option<f32>,
    /// Per-attempt timeout override (non-streaming)
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Per-attempt timeout override (streaming)
    #[serde(default, with = "humantime_serde")]
    pub stream_timeout: Option<Duration>,
    /// Whether the configured model accepts images; `false` for text-only models
    #[serde(default = "default_true")]
    pub image_input: bool,
}

const fn default_true() -> bool {
    true
}

impl ProviderSettings {
    /// Create settings for a provider
    #[must_use]
    pub fn new(id: impl Into<String>, provider_type: ProviderType, priority: u32) -> Self {
        Self {
            id: id.into(),
            provider_type,
            enabled: true,
            priority,
            api_key: None,
            api_key_env: None,
            base_url: None,
            model: None,
            max_tokens: None,
            temperature: None,
            timeout: None,
            stream_timeout: None,
            image_input: true,
        }
    }

    /// Set the API key environment variable
    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Default fallback chain: Anthropic, OpenAI, Gemini
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("anthropic", ProviderType::Anthropic, 1)
                .with_api_key_env("ANTHROPIC_API_KEY"),
            Self::new("openai", ProviderType::OpenAI, 2).with_api_key_env("OPENAI_API_KEY"),
            Self::new("gemini", ProviderType::Gemini, 3).with_api_key_env("GEMINI_API_KEY"),
        ]
    }

    /// Resolve the API key (inline value first, then environment)
    pub fn resolve_api_key<F>(&self, lookup: F) -> Option<SecretString>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(lookup)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::new)
        })
    }
}

/// Authentication collaborator settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Accepted client API keys; empty accepts any bearer credential
    pub api_keys: Vec<SecretString>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert_eq!(config.routing.failure_threshold, 3);

        let ids: Vec<&str> = config
            .enabled_providers()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["anthropic", "openai", "gemini"]);
    }

    #[test]
    fn test_resolve_api_key() {
        let settings = ProviderSettings::new("openai", ProviderType::OpenAI, 1)
            .with_api_key_env("OPENAI_API_KEY");

        let key = settings.resolve_api_key(|var| {
            (var == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        });
        assert_eq!(key.map(|k| k.expose_secret().clone()), Some("sk-test".to_string()));

        assert!(settings.resolve_api_key(|_| None).is_none());
        assert!(settings.resolve_api_key(|_| Some("  ".to_string())).is_none());
    }

    #[test]
    fn test_invalid_rate_limit() {
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(config.check().is_err());
    }

    #[test]
    fn test_duplicate_provider_ids() {
        let mut config = GatewayConfig::default();
        config
            .providers
            .push(ProviderSettings::new("openai", ProviderType::OpenAI, 9));
        assert!(config.check().is_err());
    }

    #[test]
    fn test_disabled_providers_are_excluded() {
        let mut config = GatewayConfig::default();
        config.providers[0].enabled = false;
        assert_eq!(config.enabled_providers().len(), 2);
    }
}
