//! Request types for the gateway.
//!
//! This module defines the unified completion request that every provider
//! adapter translates into its own wire format.

use crate::error::GatewayError;
use crate::types::{MaxTokens, Temperature};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Unified completion request
///
/// Created per inbound call and discarded once the result (or stream end)
/// has been delivered. At least one of `prompt` and `history` must be
/// non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// Prompt for the final user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Prior conversation turns, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryMessage>,

    /// Image attached to the prompt turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,

    /// System instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Maximum tokens to generate (provider default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature in `[0, 2]` (provider default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Explicit provider override
    #[serde(
        default,
        rename = "provider",
        alias = "preferredProvider",
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred_provider: Option<String>,

    /// Explicit model override
    #[serde(
        default,
        rename = "model",
        alias = "preferredModel",
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred_model: Option<String>,
}

impl CompletionRequest {
    /// Create a request with a single prompt
    #[must_use]
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    /// Create a new builder for `CompletionRequest`
    #[must_use]
    pub fn builder() -> CompletionRequestBuilder {
        CompletionRequestBuilder::default()
    }

    /// Prompt text when it carries content
    #[must_use]
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    /// Whether any turn carries an image
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.is_some() || self.history.iter().any(|m| m.image.is_some())
    }

    /// Get validated temperature
    ///
    /// # Errors
    /// Returns error if temperature is out of range
    pub fn validated_temperature(&self) -> Result<Option<Temperature>, GatewayError> {
        self.temperature.map(Temperature::new).transpose()
    }

    /// Get validated max_tokens
    ///
    /// # Errors
    /// Returns error if max_tokens is zero
    pub fn validated_max_tokens(&self) -> Result<Option<MaxTokens>, GatewayError> {
        self.max_tokens.map(MaxTokens::new).transpose()
    }

    /// Validate the entire request
    ///
    /// # Errors
    /// Returns `InvalidRequest` naming the first offending field
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.prompt_text().is_none() && self.history.is_empty() {
            return Err(GatewayError::invalid_request(
                "either prompt or history must be provided",
                Some("prompt"),
            ));
        }

        for (index, message) in self.history.iter().enumerate() {
            if message.text.trim().is_empty() && message.image.is_none() {
                return Err(GatewayError::invalid_request(
                    format!("history[{index}] has no content"),
                    Some("history"),
                ));
            }
            if let Some(image) = &message.image {
                image.validate("history")?;
            }
        }

        if let Some(image) = &self.image {
            if self.prompt_text().is_none() {
                return Err(GatewayError::invalid_request(
                    "image requires a prompt",
                    Some("image"),
                ));
            }
            image.validate("image")?;
        }

        self.validated_temperature()?;
        self.validated_max_tokens()?;

        Ok(())
    }

    /// Fold history and prompt into ordered conversation turns
    ///
    /// History comes first in its original order; the prompt, when present,
    /// becomes the final user turn carrying the top-level image.
    #[must_use]
    pub fn conversation(&self) -> Vec<Turn<'_>> {
        let mut turns: Vec<Turn<'_>> = self
            .history
            .iter()
            .map(|m| Turn {
                role: m.role,
                text: &m.text,
                image: m.image.as_ref(),
            })
            .collect();

        if let Some(prompt) = self.prompt_text() {
            turns.push(Turn {
                role: Role::User,
                text: prompt,
                image: self.image.as_ref(),
            });
        }

        turns
    }
}

/// Builder for `CompletionRequest`
#[derive(Debug, Default)]
pub struct CompletionRequestBuilder {
    inner: CompletionRequest,
}

impl CompletionRequestBuilder {
    /// Set the prompt
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner.prompt = Some(prompt.into());
        self
    }

    /// Add a history message
    #[must_use]
    pub fn message(mut self, message: HistoryMessage) -> Self {
        self.inner.history.push(message);
        self
    }

    /// Attach an image to the prompt turn
    #[must_use]
    pub fn image(mut self, image: ImageAttachment) -> Self {
        self.inner.image = Some(image);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.inner.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set max_tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.inner.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.inner.temperature = Some(temperature);
        self
    }

    /// Set the preferred provider
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.inner.preferred_provider = Some(provider.into());
        self
    }

    /// Set the preferred model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.inner.preferred_model = Some(model.into());
        self
    }

    /// Build and validate the request
    ///
    /// # Errors
    /// Returns error if the request is invalid
    pub fn build(self) -> Result<CompletionRequest, GatewayError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// Conversation role of a history message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User turn
    User,
    /// Assistant turn
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Author of the turn
    pub role: Role,
    /// Text content
    #[serde(default)]
    pub text: String,
    /// Optional image attachment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl HistoryMessage {
    /// Create a user message
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image: None,
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image: None,
        }
    }

    /// Attach an image
    #[must_use]
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// Inline image (base64 payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl ImageAttachment {
    /// Create an image attachment
    #[must_use]
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Render as a `data:` URL
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    fn validate(&self, field: &str) -> Result<(), GatewayError> {
        if !self.mime_type.starts_with("image/") {
            return Err(GatewayError::invalid_request(
                format!("unsupported image mime type '{}'", self.mime_type),
                Some(field),
            ));
        }
        if self.data.trim().is_empty() {
            return Err(GatewayError::invalid_request("image data is empty", Some(field)));
        }
        if STANDARD.decode(self.data.trim()).is_err() {
            return Err(GatewayError::invalid_request(
                "image data is not valid base64",
                Some(field),
            ));
        }
        Ok(())
    }
}

/// Borrowed view of one conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn<'a> {
    /// Author of the turn
    pub role: Role,
    /// Text content
    pub text: &'a str,
    /// Optional image
    pub image: Option<&'a ImageAttachment>,
}
