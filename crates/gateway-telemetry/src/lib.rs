//! # Gateway Telemetry
//!
//! Observability for the AI provider gateway.
//!
//! This crate provides:
//! - Structured logging (text or JSON) via `tracing-subscriber`
//! - Prometheus metrics for requests, provider attempts, fallbacks,
//!   rate limiting, provider health, and streams

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{ActiveStreamGuard, AttemptMetrics, Metrics, MetricsConfig};
