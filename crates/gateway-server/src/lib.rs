//! # Gateway Server
//!
//! HTTP surface of the AI provider gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with graceful shutdown
//! - `POST /completions` and the Server-Sent-Events `POST /completions/stream`
//! - Per-client rate limiting in front of the fallback router
//! - A pluggable authentication collaborator
//! - Health, readiness, provider and metrics endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use auth::{AuthMethod, Authenticator, ClientIdentity, StaticKeyAuthenticator};
pub use error::ApiError;
pub use routes::create_router;
pub use server::{Server, ServerConfig, ServerError};
pub use state::{build_registry, AppState, AppStateBuilder};
