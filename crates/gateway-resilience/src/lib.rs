//! # Gateway Resilience
//!
//! Resilience patterns for the AI provider gateway:
//! - Sliding-window rate limiter with a background sweep
//! - Provider health tracking (healthy → degraded → disabled → healthy)
//! - Per-attempt timeout management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod health;
pub mod rate_limiter;
pub mod timeout;

// Re-export main types
pub use health::{HealthConfig, HealthSnapshot, HealthTracker, ProviderHealth};
pub use rate_limiter::{RateLimitConfig, RateLimitDecision, RateLimiter, SweeperHandle};
pub use timeout::{ProviderTimeouts, TimeoutConfig, TimeoutManager};
