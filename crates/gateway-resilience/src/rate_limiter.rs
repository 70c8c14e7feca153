//! Sliding-window rate limiter.
//!
//! Each client owns a log of admission timestamps (milliseconds since the
//! epoch). A check prunes the log down to the current window, then either
//! admits the request and appends `now`, or rejects it without touching the
//! log. The map entry guard makes each per-client check atomic, so
//! concurrent checks for one client never over-admit.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
    /// Clients idle for longer than this are removed by a sweep
    pub retention: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with the default retention
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    fn retention_ms(&self) -> i64 {
        i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Configured requests per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the oldest counted request leaves the window
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Time until `reset_at`, rounded up to whole seconds (at least one)
    #[must_use]
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let ms = (self.reset_at - now).num_milliseconds().max(0);
        let secs = u64::try_from(ms).unwrap_or(0).div_ceil(1000).max(1);
        Duration::from_secs(secs)
    }
}

/// Per-client sliding-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, VecDeque<i64>>,
}

impl RateLimiter {
    /// Create a rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and record a request for `client_id` against the default config
    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, &self.config, Utc::now().timestamp_millis())
    }

    /// Check and record a request using an explicit config
    pub fn check_with(&self, client_id: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.check_at(client_id, config, Utc::now().timestamp_millis())
    }

    /// Check and record a request at a given time (milliseconds since epoch)
    pub fn check_at(
        &self,
        client_id: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> RateLimitDecision {
        let window_ms = config.window_ms();
        let window_start = now_ms.saturating_sub(window_ms);

        let mut entry = self.clients.entry(client_id.to_string()).or_default();
        let log = entry.value_mut();

        while log.front().is_some_and(|&t| t <= window_start) {
            log.pop_front();
        }

        let count = u32::try_from(log.len()).unwrap_or(u32::MAX);
        if count >= config.max_requests {
            let oldest = log.front().copied().unwrap_or(now_ms);
            debug!(client = %client_id, count = count, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                limit: config.max_requests,
                remaining: 0,
                reset_at: millis_to_datetime(oldest.saturating_add(window_ms)),
            };
        }

        log.push_back(now_ms);
        let oldest = log.front().copied().unwrap_or(now_ms);

        RateLimitDecision {
            allowed: true,
            limit: config.max_requests,
            remaining: config.max_requests - (count + 1),
            reset_at: millis_to_datetime(oldest.saturating_add(window_ms)),
        }
    }

    /// Drop clients with no activity inside the retention period
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now().timestamp_millis())
    }

    /// Drop clients idle since before `now_ms - retention`
    pub fn sweep_at(&self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.config.retention_ms());
        let before = self.clients.len();
        self.clients
            .retain(|_, log| log.back().is_some_and(|&newest| newest > cutoff));
        let removed = before.saturating_sub(self.clients.len());

        if removed > 0 {
            debug!(removed = removed, remaining = self.clients.len(), "Rate limiter swept");
        }
        removed
    }

    /// Number of tracked clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Forget a client
    pub fn reset(&self, client_id: &str) {
        self.clients.remove(client_id);
    }

    /// Run [`RateLimiter::sweep`] every `interval` until the handle is dropped
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Rate limiter sweeper started");
        SweeperHandle {
            handle: Some(handle),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Owns the background sweep task; stops it when dropped
pub struct SweeperHandle {
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweep task
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Rate limiter sweeper stopped");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn limiter(max: u32, window_ms: u64) -> (RateLimiter, RateLimitConfig) {
        let config = RateLimitConfig::new(max, Duration::from_millis(window_ms));
        (RateLimiter::new(config.clone()), config)
    }

    #[test]
    fn test_admits_up_to_limit() {
        let (limiter, config) = limiter(3, 1_000);

        let remaining: Vec<u32> = (0..3)
            .map(|i| {
                let decision = limiter.check_at("client", &config, T0 + i);
                assert!(decision.allowed);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let rejected = limiter.check_at("client", &config, T0 + 10);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.limit, 3);
        assert_eq!(rejected.reset_at.timestamp_millis(), T0 + 1_000);
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let (limiter, config) = limiter(1, 1_000);

        assert!(limiter.check_at("client", &config, T0).allowed);
        for i in 1..5 {
            assert!(!limiter.check_at("client", &config, T0 + i * 100).allowed);
        }

        // Only the admitted request is counted, so the window reopens on time
        assert!(limiter.check_at("client", &config, T0 + 1_000).allowed);
    }

    #[test]
    fn test_window_slides() {
        let (limiter, config) = limiter(2, 1_000);

        assert!(limiter.check_at("client", &config, T0).allowed);
        assert!(limiter.check_at("client", &config, T0 + 500).allowed);
        assert!(!limiter.check_at("client", &config, T0 + 999).allowed);

        let decision = limiter.check_at("client", &config, T0 + 1_000);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at.timestamp_millis(), T0 + 1_500);
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, config) = limiter(1, 1_000);

        assert!(limiter.check_at("a", &config, T0).allowed);
        assert!(!limiter.check_at("a", &config, T0 + 1).allowed);
        assert!(limiter.check_at("b", &config, T0 + 1).allowed);
        assert_eq!(limiter.client_count(), 2);
    }

    #[test]
    fn test_sweep_removes_idle_clients() {
        let config = RateLimitConfig {
            max_requests: 10,
            window: Duration::from_millis(1_000),
            retention: Duration::from_millis(10_000),
        };
        let limiter = RateLimiter::new(config.clone());

        limiter.check_at("idle", &config, T0);
        limiter.check_at("active", &config, T0 + 9_000);

        assert_eq!(limiter.sweep_at(T0 + 10_000), 1);
        assert_eq!(limiter.client_count(), 1);
        assert_eq!(limiter.sweep_at(T0 + 10_000), 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = millis_to_datetime(T0);
        let decision = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at: millis_to_datetime(T0 + 1_200),
        };
        assert_eq!(decision.retry_after(now), Duration::from_secs(2));

        let past = RateLimitDecision {
            reset_at: millis_to_datetime(T0 - 5),
            ..decision
        };
        assert_eq!(past.retry_after(now), Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_over_admit() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(
            10,
            Duration::from_secs(60),
        )));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("shared").allowed })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.expect("task") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_and_stops() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_millis(10),
            retention: Duration::from_millis(10),
        }));
        let config = limiter.config().clone();
        limiter.check_at("old", &config, 0);
        assert_eq!(limiter.client_count(), 1);

        let handle = limiter.spawn_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(limiter.client_count(), 0);

        handle.shutdown();
        limiter.check_at("old", &config, 0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(limiter.client_count(), 1);
    }
}
