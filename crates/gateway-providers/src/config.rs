//! Adapter configuration shared by all providers.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Configuration for a single provider adapter
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Adapter identifier
    pub id: String,
    /// API key; the adapter is unconfigured without one
    pub api_key: Option<SecretString>,
    /// Base URL override (proxies, tests)
    pub base_url: Option<String>,
    /// Default model override
    pub model: Option<String>,
    /// Default max tokens
    pub max_tokens: Option<u32>,
    /// Default temperature
    pub temperature: Option<f32>,
    /// HTTP timeout for non-streaming calls
    pub timeout: Duration,
    /// Whether the configured model accepts image attachments
    pub image_input: bool,
}

impl AdapterConfig {
    /// Create a configuration with no credentials
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: None,
            temperature: None,
            timeout: Duration::from_secs(30),
            image_input: true,
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Set the API key from an existing secret
    #[must_use]
    pub fn with_api_key_secret(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the default max tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the default temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the HTTP timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable image input (text-only models)
    #[must_use]
    pub const fn with_image_input(mut self, enabled: bool) -> Self {
        self.image_input = enabled;
        self
    }

    /// Whether a non-empty API key is present
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }

    /// API key text (empty when absent)
    pub(crate) fn api_key_str(&self) -> &str {
        self.api_key
            .as_ref()
            .map_or("", |k| k.expose_secret().as_str())
    }

    /// Base URL without a trailing slash
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_presence() {
        assert!(!AdapterConfig::new("openai").has_api_key());
        assert!(!AdapterConfig::new("openai").with_api_key("  ").has_api_key());
        assert!(AdapterConfig::new("openai").with_api_key("sk-test").has_api_key());
    }

    #[test]
    fn test_image_input_defaults_on() {
        assert!(AdapterConfig::new("openai").image_input);
        assert!(!AdapterConfig::new("openai").with_image_input(false).image_input);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = AdapterConfig::new("openai").with_base_url("http://localhost:9000/");
        assert_eq!(config.base_url_or("https://api.openai.com"), "http://localhost:9000");
        assert_eq!(
            AdapterConfig::new("openai").base_url_or("https://api.openai.com"),
            "https://api.openai.com"
        );
    }
}
