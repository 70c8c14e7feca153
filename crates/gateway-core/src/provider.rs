//! Provider adapter abstraction.
//!
//! Every upstream AI provider is wrapped in an adapter implementing
//! [`LLMProvider`]. Adapters differ only in wire format; the fallback router
//! treats them uniformly through this trait and their capability flags.

use crate::error::{GatewayError, GatewayResult};
use crate::request::CompletionRequest;
use crate::response::CompletionResult;
use crate::streaming::{single_fragment, FragmentStream};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions API
    #[serde(rename = "openai")]
    OpenAI,
    /// Google Gemini API
    Gemini,
    /// Any other implementation (test doubles, proxies)
    Custom,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Capability flags of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    /// Native incremental streaming
    pub streaming: bool,
    /// Accepts image attachments
    pub image_input: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            streaming: true,
            image_input: false,
        }
    }
}

/// Soft health signal of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No recent failures
    Healthy,
    /// Recent consecutive failures below the disable threshold
    Degraded,
    /// Skipped until its cool-down elapses
    Disabled,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Static description of a registered adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Adapter identifier
    pub id: String,
    /// Provider family
    pub provider_type: ProviderType,
    /// Base priority rank (lower is tried first)
    pub priority: u32,
    /// Capability flags
    pub capabilities: ProviderCapabilities,
    /// Whether credentials are present
    pub configured: bool,
}

/// Provider adapter trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Adapter identifier, reported in `CompletionResult::provider`
    fn id(&self) -> &str;

    /// Provider family
    fn provider_type(&self) -> ProviderType;

    /// Capability flags
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Model used when the request does not name one
    fn default_model(&self) -> &str;

    /// Whether credentials are present; unconfigured adapters are never attempted
    fn is_configured(&self) -> bool {
        true
    }

    /// Produce a complete response
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResult>;

    /// Produce an incremental response
    ///
    /// Adapters without native streaming fall back to a single aggregate
    /// fragment.
    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<FragmentStream> {
        let result = self.complete(request).await?;
        Ok(single_fragment(result.content))
    }

    /// Reject request shapes this adapter cannot serve
    fn check_capabilities(&self, request: &CompletionRequest) -> GatewayResult<()> {
        if request.has_image() && !self.capabilities().image_input {
            return Err(GatewayError::capability_unsupported(self.id(), "image input"));
        }
        Ok(())
    }

    /// Model for this request.
    ///
    /// The requested model is provider-specific: it applies only when no
    /// provider is named or this adapter is the named one. Fallback adapters
    /// use their own default.
    fn resolve_model(&self, request: &CompletionRequest) -> String {
        let targets_self = request
            .preferred_provider
            .as_deref()
            .map_or(true, |preferred| preferred == self.id());

        match &request.preferred_model {
            Some(model) if targets_self => model.clone(),
            _ => self.default_model().to_string(),
        }
    }
}
