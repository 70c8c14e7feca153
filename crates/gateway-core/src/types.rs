//! Validated domain types (newtypes).

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Sampling temperature in `[0.0, 2.0]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    /// Lowest accepted value
    pub const MIN: f32 = 0.0;
    /// Highest accepted value
    pub const MAX: f32 = 2.0;

    /// Create a validated temperature
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the value is not finite or out of range
    pub fn new(value: f32) -> Result<Self, GatewayError> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(GatewayError::invalid_request(
                format!("temperature must be between 0.0 and 2.0, got {value}"),
                Some("temperature"),
            ));
        }
        Ok(Self(value))
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for Temperature {
    type Error = GatewayError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> Self {
        t.0
    }
}

/// Maximum number of tokens to generate (positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct MaxTokens(u32);

impl MaxTokens {
    /// Create a validated token limit
    ///
    /// # Errors
    /// Returns `InvalidRequest` if the value is zero
    pub fn new(value: u32) -> Result<Self, GatewayError> {
        if value == 0 {
            return Err(GatewayError::invalid_request(
                "maxTokens must be a positive integer",
                Some("maxTokens"),
            ));
        }
        Ok(Self(value))
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for MaxTokens {
    type Error = GatewayError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaxTokens> for u32 {
    fn from(m: MaxTokens) -> Self {
        m.0
    }
}
