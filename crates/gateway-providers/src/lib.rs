//! # Gateway Providers
//!
//! Provider adapters for the AI provider gateway.
//!
//! Each adapter translates the unified [`gateway_core::CompletionRequest`]
//! into one vendor's wire format and normalizes the response, streamed
//! fragments, and failures back into gateway types:
//! - Anthropic (Messages API)
//! - OpenAI (Chat Completions API)
//! - Google AI (Gemini `generateContent`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod factory;
mod http;
pub mod registry;
pub mod sse;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "google")]
pub mod google;

// Re-export main types
pub use config::AdapterConfig;
pub use factory::create_provider;
pub use registry::{ProviderEntry, ProviderRegistry};
pub use sse::{SseDecoder, SseError, SseEvent, DEFAULT_MAX_EVENT_SIZE};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;

#[cfg(feature = "openai")]
pub use openai::OpenAIProvider;

#[cfg(feature = "google")]
pub use google::GoogleProvider;
