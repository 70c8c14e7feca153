//! # Gateway Core
//!
//! Core types, traits, and error handling for the AI provider gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - The unified completion request and result contract
//! - The provider adapter trait and capability flags
//! - The shared error taxonomy
//! - Stream events produced by the streaming multiplexer
//! - Validated domain types (newtypes)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use provider::{
    HealthState, LLMProvider, ProviderCapabilities, ProviderDescriptor, ProviderType,
};
pub use request::{CompletionRequest, HistoryMessage, ImageAttachment, Role, Turn};
pub use response::{CompletionResult, NO_PROVIDER};
pub use streaming::{single_fragment, FragmentStream, StreamEvent};
pub use types::{MaxTokens, Temperature};
