//! Shared application state.

use crate::auth::{Authenticator, StaticKeyAuthenticator};
use gateway_config::{FallbackActionSetting, GatewayConfig, ProviderSettings, RoutingSettings};
use gateway_core::{GatewayError, GatewayResult};
use gateway_providers::{create_provider, AdapterConfig, ProviderRegistry};
use gateway_resilience::{
    HealthConfig, HealthTracker, ProviderTimeouts, RateLimitConfig, RateLimiter, TimeoutConfig,
    TimeoutManager,
};
use gateway_routing::{FallbackAction, FallbackPolicy, FallbackRouter};
use gateway_telemetry::{Metrics, MetricsConfig};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Fallback router
    pub router: Arc<FallbackRouter>,
    /// Local rate limiter; `None` when disabled
    pub limiter: Option<Arc<RateLimiter>>,
    /// Authentication collaborator
    pub authenticator: Arc<dyn Authenticator>,
    /// Prometheus metrics
    pub metrics: Arc<Metrics>,
    /// Process start
    pub started_at: Instant,
}

impl AppState {
    /// Create a builder
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Build everything from configuration, reading provider keys from the
    /// process environment
    ///
    /// # Errors
    /// Returns error if an adapter or the metrics registry cannot be created
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        Self::builder().config(config).build()
    }

    /// Registered adapters
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.router.registry()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.registry().len())
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for `AppState`
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    registry: Option<Arc<ProviderRegistry>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    metrics: Option<Arc<Metrics>>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a prepared registry instead of building one from `providers`
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the authentication collaborator
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Set the metrics registry
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns error if an adapter or the metrics registry cannot be created
    pub fn build(self) -> GatewayResult<AppState> {
        let config = self.config.unwrap_or_default();

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(build_registry(&config.providers, |var| {
                std::env::var(var).ok()
            })?),
        };

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                Metrics::new(&MetricsConfig::default())
                    .map_err(|e| GatewayError::internal(format!("metrics: {e}")))?,
            ),
        };

        let health = Arc::new(HealthTracker::new(HealthConfig {
            failure_threshold: config.routing.failure_threshold,
            cooldown: config.routing.cooldown,
        }));
        let timeouts = TimeoutManager::new(timeout_config(&config.routing, &config.providers));
        let router = FallbackRouter::new(
            registry,
            health,
            timeouts,
            fallback_policy(&config.routing),
        )
        .with_metrics(Arc::clone(&metrics));

        let limiter = if config.rate_limit.enabled {
            Some(Arc::new(RateLimiter::new(RateLimitConfig {
                max_requests: config.rate_limit.max_requests,
                window: config.rate_limit.window,
                retention: config.rate_limit.retention,
            })))
        } else {
            warn!("Local rate limiting disabled");
            None
        };

        let authenticator = self.authenticator.unwrap_or_else(|| {
            Arc::new(StaticKeyAuthenticator::new(config.auth.api_keys.iter()))
        });

        Ok(AppState {
            config: Arc::new(config),
            router: Arc::new(router),
            limiter,
            authenticator,
            metrics,
            started_at: Instant::now(),
        })
    }
}

/// Create and register an adapter for every enabled provider entry.
///
/// Providers whose key cannot be resolved are still registered; the router
/// treats them as unavailable.
///
/// # Errors
/// Returns error if an adapter cannot be created or an id is duplicated
pub fn build_registry<F>(providers: &[ProviderSettings], lookup: F) -> GatewayResult<ProviderRegistry>
where
    F: Fn(&str) -> Option<String>,
{
    let registry = ProviderRegistry::new();

    for settings in providers.iter().filter(|p| p.enabled) {
        let mut adapter = AdapterConfig::new(settings.id.clone())
            .with_api_key_secret(settings.resolve_api_key(&lookup))
            .with_image_input(settings.image_input);
        if let Some(base_url) = &settings.base_url {
            adapter = adapter.with_base_url(base_url.clone());
        }
        if let Some(model) = &settings.model {
            adapter = adapter.with_model(model.clone());
        }
        if let Some(max_tokens) = settings.max_tokens {
            adapter = adapter.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = settings.temperature {
            adapter = adapter.with_temperature(temperature);
        }
        if let Some(timeout) = settings.timeout {
            adapter = adapter.with_timeout(timeout);
        }

        if !adapter.has_api_key() {
            warn!(
                provider = %settings.id,
                key_env = ?settings.api_key_env,
                "No API key configured, provider will be unavailable"
            );
        }

        let provider = create_provider(settings.provider_type, adapter)?;
        registry.register(provider, settings.priority)?;
    }

    info!(
        providers = registry.len(),
        configured = registry.configured_count(),
        "Provider registry initialized"
    );
    Ok(registry)
}

fn timeout_config(routing: &RoutingSettings, providers: &[ProviderSettings]) -> TimeoutConfig {
    let base = TimeoutConfig {
        request: routing.request_timeout,
        stream: routing.stream_timeout,
        stream_idle: routing.stream_idle_timeout,
        ..TimeoutConfig::default()
    };

    providers
        .iter()
        .filter(|p| p.timeout.is_some() || p.stream_timeout.is_some())
        .fold(base, |config, p| {
            config.with_override(
                p.id.clone(),
                ProviderTimeouts {
                    request: p.timeout,
                    stream: p.stream_timeout,
                },
            )
        })
}

fn fallback_policy(routing: &RoutingSettings) -> FallbackPolicy {
    routing
        .policy
        .iter()
        .fold(FallbackPolicy::default(), |policy, (kind, setting)| {
            let action = match setting {
                FallbackActionSetting::Fallback => FallbackAction::PENALIZE,
                FallbackActionSetting::FallbackNoPenalty => FallbackAction::NO_PENALTY,
                FallbackActionSetting::Abort => FallbackAction::Abort,
            };
            policy.with_override(*kind, action)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{ErrorKind, ProviderType};
    use std::time::Duration;

    #[test]
    fn test_build_registry_resolves_keys() {
        let providers = ProviderSettings::defaults();
        let registry = build_registry(&providers, |var| {
            (var == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        })
        .expect("registry");

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.configured_count(), 1);
        let order: Vec<String> = registry.ordered().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(order, vec!["anthropic", "openai", "gemini"]);
    }

    #[test]
    fn test_disabled_providers_are_not_registered() {
        let mut providers = ProviderSettings::defaults();
        providers[2].enabled = false;

        let registry = build_registry(&providers, |_| None).expect("registry");
        assert!(!registry.contains("gemini"));
    }

    #[test]
    fn test_custom_provider_type_is_rejected() {
        let providers = vec![ProviderSettings::new("mine", ProviderType::Custom, 1)];
        assert!(build_registry(&providers, |_| None).is_err());
    }

    #[test]
    fn test_policy_overrides() {
        let mut routing = RoutingSettings::default();
        routing
            .policy
            .insert(ErrorKind::RateLimited, FallbackActionSetting::FallbackNoPenalty);
        routing
            .policy
            .insert(ErrorKind::ProviderError, FallbackActionSetting::Abort);

        let policy = fallback_policy(&routing);
        assert_eq!(policy.action(ErrorKind::RateLimited), FallbackAction::NO_PENALTY);
        assert_eq!(policy.action(ErrorKind::ProviderError), FallbackAction::Abort);
        assert_eq!(policy.action(ErrorKind::InvalidRequest), FallbackAction::Abort);
    }

    #[test]
    fn test_timeout_overrides() {
        let mut providers = ProviderSettings::defaults();
        providers[1].timeout = Some(Duration::from_secs(5));

        let manager = TimeoutManager::new(timeout_config(&RoutingSettings::default(), &providers));
        assert_eq!(manager.attempt_timeout("openai", false), Duration::from_secs(5));
        assert_eq!(manager.attempt_timeout("anthropic", false), Duration::from_secs(30));
    }
}
