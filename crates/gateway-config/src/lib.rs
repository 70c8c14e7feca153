//! # Gateway Config
//!
//! Configuration management for the AI provider gateway.
//!
//! Configuration is assembled in three layers:
//! - Built-in defaults (100 requests / 15 minutes, Anthropic → OpenAI → Gemini)
//! - An optional YAML or TOML file named by `GATEWAY_CONFIG`
//! - `GATEWAY_*` environment overrides

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod settings;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_path, CONFIG_PATH_ENV};
pub use settings::{
    AuthSettings, FallbackActionSetting, GatewayConfig, LogFormat, LoggingSettings,
    ProviderSettings, RateLimitSettings, RoutingSettings, ServerSettings,
};
