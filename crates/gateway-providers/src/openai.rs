//! OpenAI provider implementation.
//!
//! Speaks the Chat Completions API (`POST /v1/chat/completions`). Streamed
//! chunks carry text in `choices[0].delta.content` and the stream ends with
//! `data: [DONE]`.

use crate::config::AdapterConfig;
use crate::http::{self, SseAction};
use crate::sse::SseEvent;
use async_trait::async_trait;
use gateway_core::{
    CompletionRequest, CompletionResult, FragmentStream, GatewayError, GatewayResult,
    LLMProvider, ProviderCapabilities, ProviderType, Role, Turn,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI Chat Completions adapter
pub struct OpenAIProvider {
    config: AdapterConfig,
    client: Client,
    capabilities: ProviderCapabilities,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: AdapterConfig) -> GatewayResult<Self> {
        let client = http::build_client()?;
        let base_url = config.base_url_or(DEFAULT_BASE_URL);

        let capabilities = ProviderCapabilities {
            streaming: true,
            image_input: config.image_input,
        };

        Ok(Self {
            config,
            client,
            capabilities,
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn ensure_configured(&self) -> GatewayResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::provider(self.id(), "provider not configured", None))
        }
    }

    /// Transform a gateway request to OpenAI's format
    fn transform_request(&self, request: &CompletionRequest, stream: bool) -> OpenAIRequest {
        let mut messages = Vec::new();

        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(OpenAIMessage {
                role: "system",
                content: OpenAIContent::Text(system.to_string()),
            });
        }

        messages.extend(request.conversation().into_iter().map(Self::transform_turn));

        OpenAIRequest {
            model: self.resolve_model(request),
            messages,
            max_tokens: request.max_tokens.or(self.config.max_tokens),
            temperature: request.temperature.or(self.config.temperature),
            stream,
        }
    }

    fn transform_turn(turn: Turn<'_>) -> OpenAIMessage {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let content = match turn.image {
            None => OpenAIContent::Text(turn.text.to_string()),
            Some(image) => {
                let mut parts = Vec::new();
                if !turn.text.is_empty() {
                    parts.push(OpenAIPart::Text {
                        text: turn.text.to_string(),
                    });
                }
                parts.push(OpenAIPart::ImageUrl {
                    image_url: OpenAIImageUrl {
                        url: image.data_url(),
                    },
                });
                OpenAIContent::Parts(parts)
            }
        };

        OpenAIMessage { role, content }
    }

    /// Map one streaming event
    fn handle_event(provider: &str, event: &SseEvent) -> GatewayResult<SseAction> {
        if event.is_done() {
            return Ok(SseAction::Done);
        }

        let Ok(chunk) = serde_json::from_str::<OpenAIStreamChunk>(&event.data) else {
            return Ok(SseAction::Skip);
        };

        if let Some(error) = chunk.error {
            return Err(GatewayError::provider(provider, error.message, None));
        }

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty())
            .map_or(SseAction::Skip, SseAction::Fragment))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn default_model(&self) -> &str {
        self.config.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn is_configured(&self) -> bool {
        self.config.has_api_key()
    }

    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResult> {
        self.ensure_configured()?;
        self.check_capabilities(request)?;

        let body = self.transform_request(request, false);
        debug!(provider = %self.id(), model = %body.model, "Sending completion request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key_str())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.id(), error = %e, "OpenAI API request failed");
                http::transport_error(self.id(), &e, self.config.timeout)
            })?;

        if !response.status().is_success() {
            return Err(http::error_from_response(self.id(), response, self.config.timeout).await);
        }

        let parsed: OpenAIResponse = response.json().await.map_err(|e| {
            GatewayError::provider(self.id(), format!("Invalid response JSON: {e}"), None)
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::provider(self.id(), "No choices in response", None))?;

        Ok(CompletionResult::success(
            choice.message.content.unwrap_or_default(),
            self.id(),
            parsed.model.unwrap_or(body.model),
        ))
    }

    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<FragmentStream> {
        self.ensure_configured()?;
        self.check_capabilities(request)?;

        let body = self.transform_request(request, true);
        debug!(provider = %self.id(), model = %body.model, "Sending streaming request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.id(), error = %e, "OpenAI streaming request failed");
                http::transport_error(self.id(), &e, self.config.timeout)
            })?;

        if !response.status().is_success() {
            return Err(http::error_from_response(self.id(), response, self.config.timeout).await);
        }

        let provider = self.id().to_string();
        Ok(http::sse_fragments(provider.clone(), response, move |event| {
            Self::handle_event(&provider, event)
        }))
    }
}

// OpenAI API Types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: OpenAIContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIPart {
    Text { text: String },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    #[serde(default)]
    message: String,
}
