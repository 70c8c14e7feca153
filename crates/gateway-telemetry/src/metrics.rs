//! Prometheus metrics.

use gateway_core::{ErrorKind, HealthState};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::warn;

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric name prefix
    pub namespace: String,
    /// Provider latency histogram buckets (seconds)
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "gateway".to_string(),
            latency_buckets: vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
        }
    }
}

/// Outcome of one provider attempt
#[derive(Debug, Clone)]
pub struct AttemptMetrics<'a> {
    /// Provider identifier
    pub provider: &'a str,
    /// Time spent on the attempt
    pub latency: Duration,
    /// Failure classification; `None` on success
    pub error_kind: Option<ErrorKind>,
    /// Whether the attempt was a streaming call
    pub streaming: bool,
}

/// Gateway metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    provider_attempts_total: IntCounterVec,
    provider_latency_seconds: HistogramVec,
    fallbacks_total: IntCounter,
    rate_limited_total: IntCounter,
    provider_health: IntGaugeVec,
    active_streams: IntGauge,
    stream_fragments_total: IntCounterVec,
}

impl Metrics {
    /// Create and register all metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or registered
    pub fn new(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let ns = config.namespace.as_str();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Completion requests by endpoint and outcome").namespace(ns),
            &["endpoint", "outcome"],
        )?;
        let provider_attempts_total = IntCounterVec::new(
            Opts::new("provider_attempts_total", "Provider attempts by outcome").namespace(ns),
            &["provider", "mode", "outcome"],
        )?;
        let provider_latency_seconds = HistogramVec::new(
            HistogramOpts::new("provider_latency_seconds", "Provider attempt latency")
                .namespace(ns)
                .buckets(config.latency_buckets.clone()),
            &["provider", "mode"],
        )?;
        let fallbacks_total = IntCounter::with_opts(
            Opts::new("fallbacks_total", "Times the router moved to the next provider").namespace(ns),
        )?;
        let rate_limited_total = IntCounter::with_opts(
            Opts::new("rate_limited_total", "Requests rejected by the local rate limiter")
                .namespace(ns),
        )?;
        let provider_health = IntGaugeVec::new(
            Opts::new(
                "provider_health",
                "Provider health (0=healthy, 1=degraded, 2=disabled)",
            )
            .namespace(ns),
            &["provider"],
        )?;
        let active_streams = IntGauge::with_opts(
            Opts::new("active_streams", "Streams currently being relayed").namespace(ns),
        )?;
        let stream_fragments_total = IntCounterVec::new(
            Opts::new("stream_fragments_total", "Fragments relayed to clients").namespace(ns),
            &["provider"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(provider_attempts_total.clone()))?;
        registry.register(Box::new(provider_latency_seconds.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(provider_health.clone()))?;
        registry.register(Box::new(active_streams.clone()))?;
        registry.register(Box::new(stream_fragments_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            provider_attempts_total,
            provider_latency_seconds,
            fallbacks_total,
            rate_limited_total,
            provider_health,
            active_streams,
            stream_fragments_total,
        })
    }

    /// Count a request at the HTTP boundary
    pub fn record_request(&self, endpoint: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Record one provider attempt
    pub fn record_attempt(&self, attempt: &AttemptMetrics<'_>) {
        let mode = if attempt.streaming { "stream" } else { "complete" };
        let outcome = attempt.error_kind.map_or("success", |kind| kind.as_str());

        self.provider_attempts_total
            .with_label_values(&[attempt.provider, mode, outcome])
            .inc();
        self.provider_latency_seconds
            .with_label_values(&[attempt.provider, mode])
            .observe(attempt.latency.as_secs_f64());
    }

    /// Count a move to the next provider
    pub fn record_fallback(&self) {
        self.fallbacks_total.inc();
    }

    /// Count a local rate limit rejection
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    /// Publish a provider's health state
    pub fn set_provider_health(&self, provider: &str, state: HealthState) {
        let value = match state {
            HealthState::Healthy => 0,
            HealthState::Degraded => 1,
            HealthState::Disabled => 2,
        };
        self.provider_health.with_label_values(&[provider]).set(value);
    }

    /// Count a relayed fragment
    pub fn record_fragment(&self, provider: &str) {
        self.stream_fragments_total
            .with_label_values(&[provider])
            .inc();
    }

    /// Track a stream until the guard is dropped
    #[must_use]
    pub fn stream_started(&self) -> ActiveStreamGuard {
        self.active_streams.inc();
        ActiveStreamGuard {
            gauge: self.active_streams.clone(),
        }
    }

    /// Render all metrics in the Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Decrements the active stream gauge on drop
#[derive(Debug)]
pub struct ActiveStreamGuard {
    gauge: IntGauge,
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
