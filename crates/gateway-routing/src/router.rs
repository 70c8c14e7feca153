//! Fallback router.
//!
//! Walks the provider chain for one request: the preferred adapter first when
//! it is healthy, then the registry's rank order, skipping adapters that are
//! unconfigured or disabled. Every attempt runs under its own timeout budget
//! and every failure is classified by the [`FallbackPolicy`] into "next
//! adapter" or "abort the chain".

use crate::multiplexer::{StreamMultiplexer, StreamObservers, StreamSource};
use crate::policy::{FallbackAction, FallbackPolicy};
use futures::StreamExt;
use gateway_core::{
    single_fragment, CompletionRequest, CompletionResult, FragmentStream, GatewayError,
    GatewayResult, HealthState, LLMProvider,
};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{HealthTracker, TimeoutManager};
use gateway_telemetry::{AttemptMetrics, Metrics};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Routes completion requests across the registered adapters
pub struct FallbackRouter {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthTracker>,
    timeouts: TimeoutManager,
    policy: FallbackPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl FallbackRouter {
    /// Create a router over a registry and health tracker
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthTracker>,
        timeouts: TimeoutManager,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            registry,
            health,
            timeouts,
            policy,
            metrics: None,
        }
    }

    /// Record attempt outcomes into `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registered adapters
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Shared health state
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Adapters to attempt for `request`, in order
    pub fn candidates(&self, request: &CompletionRequest) -> Vec<Arc<dyn LLMProvider>> {
        let preferred = request.preferred_provider.as_deref();
        let mut ordered: Vec<Arc<dyn LLMProvider>> = Vec::new();
        let mut front: Option<Arc<dyn LLMProvider>> = None;

        for entry in self.registry.ordered() {
            let id = entry.id();
            if !entry.provider.is_configured() {
                self.health.mark_unavailable(id);
                continue;
            }
            if !self.health.is_eligible(id) {
                debug!(provider = %id, "Skipping ineligible provider");
                continue;
            }
            // A degraded preferred adapter keeps its rank position
            if preferred == Some(id) && self.health.state(id) == HealthState::Healthy {
                front = Some(Arc::clone(&entry.provider));
            } else {
                ordered.push(Arc::clone(&entry.provider));
            }
        }

        if let Some(provider) = front {
            ordered.insert(0, provider);
        } else if let Some(name) = preferred {
            debug!(provider = %name, "Preferred provider not healthy, using default order");
        }

        ordered
    }

    /// Produce a complete response, falling back across adapters.
    ///
    /// Never fails: every outcome, including exhaustion and caller errors,
    /// is a structured [`CompletionResult`].
    #[instrument(skip_all, fields(preferred = ?request.preferred_provider))]
    pub async fn route(&self, request: &CompletionRequest) -> CompletionResult {
        if let Err(error) = request.validate() {
            debug!(error = %error, "Rejected invalid request");
            return CompletionResult::from_error(&error);
        }

        let candidates = self.candidates(request);
        let total = candidates.len();
        let mut last_error: Option<GatewayError> = None;

        for (index, provider) in candidates.into_iter().enumerate() {
            let attempt = index + 1;
            let id = provider.id().to_string();
            let started = Instant::now();

            let outcome = match provider.check_capabilities(request) {
                Ok(()) => self.timeouts.run(&id, false, provider.complete(request)).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok(result) => {
                    self.on_success(&id, attempt, started.elapsed(), false);
                    return result.with_provider(id).with_attempts(attempt);
                }
                Err(error) => {
                    let action = self.on_failure(&id, attempt, &error, started.elapsed(), false);
                    if action == FallbackAction::Abort {
                        return CompletionResult::from_error(&error).with_attempts(attempt);
                    }
                    if attempt < total {
                        self.count_fallback();
                    }
                    last_error = Some(error);
                }
            }
        }

        warn!(attempts = total, "All providers exhausted");
        CompletionResult::exhausted(total, last_error.as_ref())
    }

    /// Open a stream, falling back across adapters until one produces its
    /// first fragment.
    ///
    /// Once a fragment has been received the adapter is committed; later
    /// failures surface as a stream error event, never as a fallback.
    ///
    /// # Errors
    /// Returns the structured failure when no adapter could start streaming
    /// or the chain was aborted
    #[instrument(skip_all, fields(preferred = ?request.preferred_provider))]
    pub async fn route_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<StreamMultiplexer, CompletionResult> {
        if let Err(error) = request.validate() {
            debug!(error = %error, "Rejected invalid request");
            return Err(CompletionResult::from_error(&error));
        }

        let candidates = self.candidates(request);
        let total = candidates.len();
        let mut last_error: Option<GatewayError> = None;

        for (index, provider) in candidates.into_iter().enumerate() {
            let attempt = index + 1;
            let id = provider.id().to_string();
            let started = Instant::now();

            let outcome = match provider.check_capabilities(request) {
                Ok(()) => self.open_stream(provider.as_ref(), request).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok((first, upstream)) => {
                    self.on_success(&id, attempt, started.elapsed(), true);
                    let source = StreamSource {
                        model: provider.resolve_model(request),
                        provider: id,
                        first,
                        upstream,
                        attempts: attempt,
                    };
                    let observers = StreamObservers {
                        health: Some(Arc::clone(&self.health)),
                        metrics: self.metrics.clone(),
                    };
                    return Ok(StreamMultiplexer::from_source(
                        source,
                        self.timeouts.idle_timeout(),
                        observers,
                    ));
                }
                Err(error) => {
                    let action = self.on_failure(&id, attempt, &error, started.elapsed(), true);
                    if action == FallbackAction::Abort {
                        return Err(CompletionResult::from_error(&error).with_attempts(attempt));
                    }
                    if attempt < total {
                        self.count_fallback();
                    }
                    last_error = Some(error);
                }
            }
        }

        warn!(attempts = total, "All providers exhausted before streaming");
        Err(CompletionResult::exhausted(total, last_error.as_ref()))
    }

    /// Start one adapter's stream and wait for its first fragment under the
    /// attempt budget. Adapters without native streaming are completed and
    /// replayed as one fragment.
    async fn open_stream(
        &self,
        provider: &dyn LLMProvider,
        request: &CompletionRequest,
    ) -> GatewayResult<(Option<String>, FragmentStream)> {
        let id = provider.id();
        let native = provider.capabilities().streaming;
        let budget = self.timeouts.attempt_timeout(id, native);

        let opening = async {
            let mut upstream = if native {
                provider.stream(request).await?
            } else {
                single_fragment(provider.complete(request).await?.content)
            };

            while let Some(item) = upstream.next().await {
                let fragment = item?;
                if !fragment.is_empty() {
                    return Ok((Some(fragment), upstream));
                }
            }
            Ok::<_, GatewayError>((None, upstream))
        };

        match tokio::time::timeout(budget, opening).await {
            Ok(opened) => opened,
            Err(_) => {
                warn!(provider = %id, timeout_ms = budget.as_millis() as u64, "Stream did not start in time");
                Err(GatewayError::timeout(id, budget))
            }
        }
    }

    fn on_success(&self, provider: &str, attempt: usize, latency: Duration, streaming: bool) {
        self.health.record_success(provider);
        info!(
            provider = %provider,
            attempt = attempt,
            latency_ms = latency.as_millis() as u64,
            streaming = streaming,
            "Provider attempt succeeded"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(&AttemptMetrics {
                provider,
                latency,
                error_kind: None,
                streaming,
            });
            metrics.set_provider_health(provider, self.health.state(provider));
        }
    }

    fn on_failure(
        &self,
        provider: &str,
        attempt: usize,
        error: &GatewayError,
        latency: Duration,
        streaming: bool,
    ) -> FallbackAction {
        let kind = error.kind();
        let action = self.policy.action(kind);

        if let FallbackAction::Fallback { penalize: true } = action {
            self.health.record_failure(provider);
        }

        warn!(
            provider = %provider,
            attempt = attempt,
            error_kind = %kind,
            error = %error,
            action = ?action,
            "Provider attempt failed"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(&AttemptMetrics {
                provider,
                latency,
                error_kind: Some(kind),
                streaming,
            });
            metrics.set_provider_health(provider, self.health.state(provider));
        }

        action
    }

    fn count_fallback(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_fallback();
        }
    }
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("providers", &self.registry.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
