//! Adapter construction by provider family.

use crate::config::AdapterConfig;
use gateway_core::{GatewayError, GatewayResult, LLMProvider, ProviderType};
use std::sync::Arc;

/// Build the adapter for a provider family
///
/// # Errors
/// Returns a configuration error for families without a built-in adapter
/// (or whose feature is disabled), or if the adapter cannot be created
pub fn create_provider(
    provider_type: ProviderType,
    config: AdapterConfig,
) -> GatewayResult<Arc<dyn LLMProvider>> {
    match provider_type {
        #[cfg(feature = "anthropic")]
        ProviderType::Anthropic => Ok(Arc::new(crate::AnthropicProvider::new(config)?)),
        #[cfg(feature = "openai")]
        ProviderType::OpenAI => Ok(Arc::new(crate::OpenAIProvider::new(config)?)),
        #[cfg(feature = "google")]
        ProviderType::Gemini => Ok(Arc::new(crate::GoogleProvider::new(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(GatewayError::configuration(format!(
            "no built-in adapter for provider type '{other}' (id '{}')",
            config.id
        ))),
    }
}
