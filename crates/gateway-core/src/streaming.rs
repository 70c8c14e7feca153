//! Streaming types.

use crate::error::{ErrorKind, GatewayResult};
use crate::response::CompletionResult;
use futures::stream::{self, BoxStream, StreamExt};

/// Lazy, finite, non-restartable sequence of text fragments
pub type FragmentStream = BoxStream<'static, GatewayResult<String>>;

/// Event delivered to the transport boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One text fragment, in arrival order
    Fragment(String),
    /// Stream-level failure; nothing follows it
    Error {
        /// Failure classification
        kind: ErrorKind,
        /// Failure description
        message: String,
    },
    /// Clean end of stream with the aggregated result
    Done(CompletionResult),
}

impl StreamEvent {
    /// Whether the event ends the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done(_))
    }
}

/// Stream yielding one aggregate fragment (nothing when empty)
#[must_use]
pub fn single_fragment(text: String) -> FragmentStream {
    if text.is_empty() {
        stream::empty().boxed()
    } else {
        stream::once(async move { Ok(text) }).boxed()
    }
}
