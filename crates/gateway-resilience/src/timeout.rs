//! Per-attempt timeouts.

use gateway_core::{GatewayError, GatewayResult};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout overrides for one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderTimeouts {
    /// Non-streaming attempt budget
    pub request: Option<Duration>,
    /// Budget for a streaming attempt to produce its first fragment
    pub stream: Option<Duration>,
}

/// Timeout configuration
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Default non-streaming attempt budget
    pub request: Duration,
    /// Default budget for the first streamed fragment
    pub stream: Duration,
    /// Longest silence tolerated between fragments
    pub stream_idle: Duration,
    /// Per-provider overrides
    pub overrides: HashMap<String, ProviderTimeouts>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            stream: Duration::from_secs(120),
            stream_idle: Duration::from_secs(60),
            overrides: HashMap::new(),
        }
    }
}

impl TimeoutConfig {
    /// Add an override for a provider
    #[must_use]
    pub fn with_override(mut self, provider: impl Into<String>, timeouts: ProviderTimeouts) -> Self {
        self.overrides.insert(provider.into(), timeouts);
        self
    }
}

/// Applies timeout budgets to provider attempts
#[derive(Debug, Clone, Default)]
pub struct TimeoutManager {
    config: TimeoutConfig,
}

impl TimeoutManager {
    /// Create a manager
    #[must_use]
    pub const fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    /// Budget for one attempt against `provider`
    #[must_use]
    pub fn attempt_timeout(&self, provider: &str, streaming: bool) -> Duration {
        let overrides = self.config.overrides.get(provider);
        if streaming {
            overrides
                .and_then(|o| o.stream)
                .unwrap_or(self.config.stream)
        } else {
            overrides
                .and_then(|o| o.request)
                .unwrap_or(self.config.request)
        }
    }

    /// Longest silence tolerated between streamed fragments
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.config.stream_idle
    }

    /// Run `fut` under the attempt budget for `provider`.
    ///
    /// # Errors
    /// Returns `GatewayError::Timeout` if the budget elapses, otherwise the
    /// future's own result
    pub async fn run<T, F>(&self, provider: &str, streaming: bool, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let budget = self.attempt_timeout(provider, streaming);
        if let Ok(result) = tokio::time::timeout(budget, fut).await {
            result
        } else {
            warn!(
                provider = %provider,
                timeout_ms = budget.as_millis() as u64,
                "Provider attempt timed out"
            );
            Err(GatewayError::timeout(provider, budget))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ErrorKind;

    #[test]
    fn test_overrides() {
        let manager = TimeoutManager::new(TimeoutConfig::default().with_override(
            "openai",
            ProviderTimeouts {
                request: Some(Duration::from_secs(5)),
                stream: None,
            },
        ));

        assert_eq!(manager.attempt_timeout("openai", false), Duration::from_secs(5));
        assert_eq!(manager.attempt_timeout("openai", true), Duration::from_secs(120));
        assert_eq!(manager.attempt_timeout("gemini", false), Duration::from_secs(30));
        assert_eq!(manager.idle_timeout(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let manager = TimeoutManager::default();
        let result: GatewayResult<()> = manager
            .run("anthropic", false, async {
                tokio::time::sleep(Duration::from_secs(31)).await;
                Ok(())
            })
            .await;

        let err = result.expect_err("should time out");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.provider_id(), Some("anthropic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_passes_through() {
        let manager = TimeoutManager::default();
        let result = manager.run("anthropic", false, async { Ok(7) }).await;
        assert_eq!(result.expect("ok"), 7);
    }
}
