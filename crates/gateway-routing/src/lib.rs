//! # Gateway Routing
//!
//! Fallback routing and stream multiplexing for the AI provider gateway.
//!
//! This crate provides:
//! - A configurable retry-vs-abort policy keyed by error kind
//! - The fallback router, which walks the provider chain in priority order
//!   under per-attempt timeouts and health awareness
//! - The streaming multiplexer, which relays fragments as they arrive and
//!   terminates every stream with an explicit end or error event

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod multiplexer;
pub mod policy;
pub mod router;

// Re-export main types
pub use multiplexer::{CancellationHandle, StreamMultiplexer};
pub use policy::{FallbackAction, FallbackPolicy};
pub use router::FallbackRouter;
