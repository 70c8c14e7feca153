//! Provider health tracking.
//!
//! Each adapter moves through `healthy → degraded → disabled → healthy`.
//! Consecutive failures degrade an adapter; reaching the threshold disables
//! it for a cooldown, after which it is eligible again. A success at any
//! point resets it to healthy.

use dashmap::DashMap;
use gateway_core::HealthState;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const HEALTHY: u8 = 0;
const DEGRADED: u8 = 1;
const DISABLED: u8 = 2;

fn state_from_u8(value: u8) -> HealthState {
    match value {
        DEGRADED => HealthState::Degraded,
        DISABLED => HealthState::Disabled,
        _ => HealthState::Healthy,
    }
}

/// Health tracking configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures before an adapter is disabled
    pub failure_threshold: u32,
    /// How long a disabled adapter is skipped
    pub cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Health record for a single adapter
pub struct ProviderHealth {
    /// Provider identifier
    provider_id: String,
    /// Configuration
    config: HealthConfig,
    /// Current state (atomic for lock-free reads)
    state: AtomicU8,
    /// Failures since the last success
    consecutive_failures: AtomicU32,
    /// Lifetime failures
    total_failures: AtomicU64,
    /// Lifetime successes
    total_successes: AtomicU64,
    /// Set when the adapter is permanently out of rotation
    unavailable: AtomicBool,
    /// End of the current cooldown; also serializes state transitions
    disabled_until: Mutex<Option<Instant>>,
}

impl ProviderHealth {
    /// Create a healthy record
    #[must_use]
    pub fn new(provider_id: impl Into<String>, config: HealthConfig) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
            state: AtomicU8::new(HEALTHY),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            disabled_until: Mutex::new(None),
        }
    }

    /// Get the provider ID
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Current state, without applying cooldown expiry
    #[must_use]
    pub fn state(&self) -> HealthState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the router may attempt this adapter now.
    ///
    /// A disabled adapter whose cooldown has elapsed is moved back to
    /// healthy here.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        if self.unavailable.load(Ordering::Acquire) {
            return false;
        }

        if self.state.load(Ordering::Acquire) != DISABLED {
            return true;
        }

        let mut disabled_until = self.disabled_until.lock();
        match *disabled_until {
            Some(until) if Instant::now() < until => false,
            _ => {
                *disabled_until = None;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.state.store(HEALTHY, Ordering::Release);
                info!(provider = %self.provider_id, "Provider cooldown elapsed, re-enabled");
                true
            }
        }
    }

    /// Record a successful attempt
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        let mut disabled_until = self.disabled_until.lock();
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let prev = self.state.swap(HEALTHY, Ordering::Release);
        *disabled_until = None;

        if prev != HEALTHY {
            info!(provider = %self.provider_id, "Provider recovered");
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut disabled_until = self.disabled_until.lock();
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if failures >= self.config.failure_threshold {
            let prev = self.state.swap(DISABLED, Ordering::Release);
            *disabled_until = Some(Instant::now() + self.config.cooldown);

            if prev != DISABLED {
                warn!(
                    provider = %self.provider_id,
                    failures = failures,
                    cooldown_ms = self.config.cooldown.as_millis() as u64,
                    "Provider disabled"
                );
            }
        } else {
            self.state.store(DEGRADED, Ordering::Release);
            debug!(
                provider = %self.provider_id,
                failures = failures,
                threshold = self.config.failure_threshold,
                "Provider degraded"
            );
        }
    }

    /// Take the adapter out of rotation until the process restarts
    pub fn mark_unavailable(&self) {
        if !self.unavailable.swap(true, Ordering::AcqRel) {
            warn!(provider = %self.provider_id, "Provider marked unavailable");
        }
    }

    /// Point-in-time view of this record
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let disabled_until = *self.disabled_until.lock();
        let cooldown_remaining_ms = disabled_until
            .map(|until| until.saturating_duration_since(Instant::now()).as_millis() as u64)
            .filter(|ms| *ms > 0);

        HealthSnapshot {
            provider: self.provider_id.clone(),
            state: self.state(),
            available: !self.unavailable.load(Ordering::Acquire),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            cooldown_remaining_ms,
        }
    }
}

/// Serializable health view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Provider identifier
    pub provider: String,
    /// Health state
    pub state: HealthState,
    /// False once marked unavailable
    pub available: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Lifetime failures
    pub total_failures: u64,
    /// Lifetime successes
    pub total_successes: u64,
    /// Remaining cooldown while disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}

/// Health records for all adapters, created on first use
pub struct HealthTracker {
    config: HealthConfig,
    providers: DashMap<String, Arc<ProviderHealth>>,
}

impl HealthTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
        }
    }

    /// Get or create the record for a provider
    pub fn get_or_create(&self, provider_id: &str) -> Arc<ProviderHealth> {
        if let Some(health) = self.providers.get(provider_id) {
            return Arc::clone(health.value());
        }
        Arc::clone(
            self.providers
                .entry(provider_id.to_string())
                .or_insert_with(|| {
                    Arc::new(ProviderHealth::new(provider_id, self.config.clone()))
                })
                .value(),
        )
    }

    /// Whether the provider may be attempted now
    pub fn is_eligible(&self, provider_id: &str) -> bool {
        self.get_or_create(provider_id).is_eligible()
    }

    /// Current state of a provider
    pub fn state(&self, provider_id: &str) -> HealthState {
        self.get_or_create(provider_id).state()
    }

    /// Record a successful attempt
    pub fn record_success(&self, provider_id: &str) {
        self.get_or_create(provider_id).record_success();
    }

    /// Record a failed attempt
    pub fn record_failure(&self, provider_id: &str) {
        self.get_or_create(provider_id).record_failure();
    }

    /// Take a provider out of rotation
    pub fn mark_unavailable(&self, provider_id: &str) {
        self.get_or_create(provider_id).mark_unavailable();
    }

    /// Snapshot of a single provider
    pub fn snapshot(&self, provider_id: &str) -> HealthSnapshot {
        self.get_or_create(provider_id).snapshot()
    }

    /// Snapshots of every tracked provider, sorted by id
    #[must_use]
    pub fn snapshots(&self) -> Vec<HealthSnapshot> {
        let mut snapshots: Vec<HealthSnapshot> =
            self.providers.iter().map(|entry| entry.snapshot()).collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, cooldown_ms: u64) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn test_initial_state() {
        let tracker = HealthTracker::default();
        assert_eq!(tracker.state("anthropic"), HealthState::Healthy);
        assert!(tracker.is_eligible("anthropic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_degrade_then_disable() {
        let tracker = tracker(3, 1_000);

        tracker.record_failure("openai");
        assert_eq!(tracker.state("openai"), HealthState::Degraded);
        tracker.record_failure("openai");
        assert_eq!(tracker.state("openai"), HealthState::Degraded);
        assert!(tracker.is_eligible("openai"));

        tracker.record_failure("openai");
        assert_eq!(tracker.state("openai"), HealthState::Disabled);
        assert!(!tracker.is_eligible("openai"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_re_enables() {
        let tracker = tracker(1, 1_000);

        tracker.record_failure("gemini");
        assert!(!tracker.is_eligible("gemini"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!tracker.is_eligible("gemini"));
        assert!(tracker.snapshot("gemini").cooldown_remaining_ms.is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(tracker.is_eligible("gemini"));
        assert_eq!(tracker.state("gemini"), HealthState::Healthy);
        assert_eq!(tracker.snapshot("gemini").consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let tracker = tracker(3, 1_000);

        tracker.record_failure("anthropic");
        tracker.record_failure("anthropic");
        tracker.record_success("anthropic");

        let snapshot = tracker.snapshot("anthropic");
        assert_eq!(snapshot.state, HealthState::Healthy);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.total_failures, 2);
        assert_eq!(snapshot.total_successes, 1);
    }

    #[test]
    fn test_mark_unavailable() {
        let tracker = HealthTracker::default();
        tracker.mark_unavailable("anthropic");
        assert!(!tracker.is_eligible("anthropic"));
        assert!(!tracker.snapshot("anthropic").available);

        // Other providers are unaffected
        assert!(tracker.is_eligible("openai"));
    }

    #[test]
    fn test_snapshots_sorted() {
        let tracker = HealthTracker::default();
        tracker.record_success("openai");
        tracker.record_failure("anthropic");

        let ids: Vec<String> = tracker.snapshots().into_iter().map(|s| s.provider).collect();
        assert_eq!(ids, vec!["anthropic".to_string(), "openai".to_string()]);
    }
}
