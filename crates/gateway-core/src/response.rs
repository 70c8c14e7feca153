//! Response types for the gateway.

use crate::error::{ErrorKind, GatewayError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider name reported when no adapter produced the result
pub const NO_PROVIDER: &str = "none";

/// Unified completion result
///
/// `error_kind` is set iff `success` is false. For streaming calls a final
/// result with the aggregated content marks stream completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    /// Generated text (possibly empty on failure)
    #[serde(rename = "text", alias = "content")]
    pub content: String,

    /// Adapter that produced the result, or `"none"`
    pub provider: String,

    /// Model actually used
    #[serde(default)]
    pub model: String,

    /// Whether the call succeeded
    pub success: bool,

    /// Failure classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Human-readable failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the local rate limit window frees a slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,

    /// Number of adapters attempted
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl CompletionResult {
    /// Create a successful result
    #[must_use]
    pub fn success(
        content: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            success: true,
            error_kind: None,
            message: None,
            reset_at: None,
            attempts: 0,
        }
    }

    /// Create a failed result not attributed to any provider
    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            provider: NO_PROVIDER.to_string(),
            model: String::new(),
            success: false,
            error_kind: Some(kind),
            message: Some(message.into()),
            reset_at: None,
            attempts: 0,
        }
    }

    /// Create a failed result from an error
    #[must_use]
    pub fn from_error(error: &GatewayError) -> Self {
        let mut result = Self::failure(error.kind(), error.to_string());
        match error {
            GatewayError::LocalRateLimitExceeded { reset_at } => {
                result.reset_at = Some(*reset_at);
            }
            GatewayError::AllProvidersExhausted { attempts, .. } => {
                result.attempts = *attempts;
            }
            _ => {}
        }
        result
    }

    /// Result for a chain where every eligible adapter failed
    #[must_use]
    pub fn exhausted(attempts: usize, last_error: Option<&GatewayError>) -> Self {
        Self::from_error(&GatewayError::AllProvidersExhausted {
            attempts,
            last_error: last_error.map(ToString::to_string),
        })
    }

    /// Set the attempt count
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the provider attribution
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}
