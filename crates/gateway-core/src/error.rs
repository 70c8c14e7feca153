//! Error taxonomy shared by every gateway component.
//!
//! Adapters translate upstream failures into [`GatewayError`]; the fallback
//! router classifies them by [`ErrorKind`] to decide between falling back to
//! the next provider and aborting the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Caller-visible classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The caller's payload is malformed
    InvalidRequest,
    /// The adapter cannot serve this request shape
    CapabilityUnsupported,
    /// The provider throttled the request
    RateLimited,
    /// No response within the attempt budget
    Timeout,
    /// The provider returned an application error
    ProviderError,
    /// Every eligible adapter failed
    AllProvidersExhausted,
    /// The gateway's own limiter rejected the call
    LocalRateLimitExceeded,
    /// A stream failed after partial output was delivered
    StreamInterrupted,
    /// Unexpected internal fault
    Internal,
}

impl ErrorKind {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::CapabilityUnsupported => "CapabilityUnsupported",
            Self::RateLimited => "RateLimited",
            Self::Timeout => "Timeout",
            Self::ProviderError => "ProviderError",
            Self::AllProvidersExhausted => "AllProvidersExhausted",
            Self::LocalRateLimitExceeded => "LocalRateLimitExceeded",
            Self::StreamInterrupted => "StreamInterrupted",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Malformed caller payload
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error message
        message: String,
        /// Offending field, if known
        field: Option<String>,
    },

    /// Adapter lacks a capability the request needs
    #[error("Provider '{provider}' does not support {capability}")]
    CapabilityUnsupported {
        /// Provider ID
        provider: String,
        /// Missing capability
        capability: String,
    },

    /// Provider-side throttling
    #[error("Provider '{provider}' rate limited the request")]
    RateLimited {
        /// Provider ID
        provider: String,
        /// Provider-suggested wait
        retry_after: Option<Duration>,
    },

    /// Attempt did not complete within its budget
    #[error("Provider '{provider}' timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Provider ID
        provider: String,
        /// Budget that elapsed
        timeout: Duration,
    },

    /// Provider returned an application error
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        /// Provider ID
        provider: String,
        /// Error message
        message: String,
        /// HTTP status code, if any
        status_code: Option<u16>,
    },

    /// Every eligible adapter failed
    #[error("All providers exhausted after {attempts} attempt(s)")]
    AllProvidersExhausted {
        /// Number of adapters attempted
        attempts: usize,
        /// Description of the last failure
        last_error: Option<String>,
    },

    /// Local limiter rejected the call
    #[error("Rate limit exceeded, resets at {reset_at}")]
    LocalRateLimitExceeded {
        /// When the oldest counted request ages out
        reset_at: DateTime<Utc>,
    },

    /// Stream failed after output was delivered
    #[error("Stream from '{provider}' interrupted: {message}")]
    StreamInterrupted {
        /// Provider ID
        provider: String,
        /// Error message
        message: String,
    },

    /// Invalid gateway configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// The caller went away
    #[error("Request cancelled")]
    Cancelled,

    /// Unexpected internal fault
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Create a capability error
    pub fn capability_unsupported(
        provider: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self::CapabilityUnsupported {
            provider: provider.into(),
            capability: capability.into(),
        }
    }

    /// Create a provider rate limit error
    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    /// Create a timeout error
    pub fn timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            provider: provider.into(),
            timeout,
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Create a stream interruption error
    pub fn stream_interrupted(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamInterrupted {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify the error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::CapabilityUnsupported { .. } => ErrorKind::CapabilityUnsupported,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::AllProvidersExhausted { .. } => ErrorKind::AllProvidersExhausted,
            Self::LocalRateLimitExceeded { .. } => ErrorKind::LocalRateLimitExceeded,
            Self::StreamInterrupted { .. } | Self::Cancelled => ErrorKind::StreamInterrupted,
            Self::Configuration { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Provider that produced the error, if any
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::CapabilityUnsupported { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Provider { provider, .. }
            | Self::StreamInterrupted { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GatewayError::invalid_request("bad", Some("prompt")).kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            GatewayError::capability_unsupported("openai", "image input").kind(),
            ErrorKind::CapabilityUnsupported
        );
        assert_eq!(
            GatewayError::rate_limited("openai", None).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            GatewayError::timeout("openai", Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            GatewayError::provider("openai", "boom", Some(500)).kind(),
            ErrorKind::ProviderError
        );
        assert_eq!(GatewayError::internal("x").kind(), ErrorKind::Internal);
        assert_eq!(GatewayError::Cancelled.kind(), ErrorKind::StreamInterrupted);
    }

    #[test]
    fn test_error_kind_wire_name() {
        let json = serde_json::to_string(&ErrorKind::AllProvidersExhausted).expect("serialize");
        assert_eq!(json, "\"AllProvidersExhausted\"");
        assert_eq!(ErrorKind::LocalRateLimitExceeded.to_string(), "LocalRateLimitExceeded");
    }

    #[test]
    fn test_provider_id() {
        let err = GatewayError::timeout("gemini", Duration::from_millis(10));
        assert_eq!(err.provider_id(), Some("gemini"));
        assert!(GatewayError::internal("x").provider_id().is_none());
        assert!(err.to_string().contains("10ms"));
    }
}
