//! Retry-vs-abort classification.

use gateway_core::ErrorKind;
use std::collections::HashMap;

/// What the router does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    /// Move on to the next adapter
    Fallback {
        /// Count the failure against the adapter's health
        penalize: bool,
    },
    /// Stop the chain and surface the error to the caller
    Abort,
}

impl FallbackAction {
    /// Fall back and penalize
    pub const PENALIZE: Self = Self::Fallback { penalize: true };
    /// Fall back without touching health
    pub const NO_PENALTY: Self = Self::Fallback { penalize: false };
}

/// Table of actions per error kind
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    actions: HashMap<ErrorKind, FallbackAction>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        let actions = HashMap::from([
            (ErrorKind::InvalidRequest, FallbackAction::Abort),
            (ErrorKind::CapabilityUnsupported, FallbackAction::NO_PENALTY),
            (ErrorKind::RateLimited, FallbackAction::PENALIZE),
            (ErrorKind::Timeout, FallbackAction::PENALIZE),
            (ErrorKind::ProviderError, FallbackAction::PENALIZE),
            (ErrorKind::StreamInterrupted, FallbackAction::PENALIZE),
            (ErrorKind::Internal, FallbackAction::PENALIZE),
        ]);
        Self { actions }
    }
}

impl FallbackPolicy {
    /// Replace the action for one kind
    #[must_use]
    pub fn with_override(mut self, kind: ErrorKind, action: FallbackAction) -> Self {
        self.actions.insert(kind, action);
        self
    }

    /// Action for a kind; kinds absent from the table fall back with a penalty
    #[must_use]
    pub fn action(&self, kind: ErrorKind) -> FallbackAction {
        self.actions
            .get(&kind)
            .copied()
            .unwrap_or(FallbackAction::PENALIZE)
    }
}
