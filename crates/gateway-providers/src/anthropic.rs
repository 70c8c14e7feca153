//! Anthropic provider implementation.
//!
//! Speaks the Messages API (`POST /v1/messages`). Streaming responses are
//! SSE; text arrives in `content_block_delta` events and the stream ends
//! with `message_stop`.

use crate::config::AdapterConfig;
use crate::http::{self, SseAction};
use async_trait::async_trait;
use gateway_core::{
    CompletionRequest, CompletionResult, FragmentStream, GatewayError, GatewayResult,
    LLMProvider, ProviderCapabilities, ProviderType, Role,
};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const API_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic Messages API adapter
pub struct AnthropicProvider {
    config: AdapterConfig,
    client: Client,
    capabilities: ProviderCapabilities,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
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
        format!("{}/v1/messages", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", self.config.api_key_str())
            .header("anthropic-version", API_VERSION)
    }

    fn ensure_configured(&self) -> GatewayResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::provider(self.id(), "provider not configured", None))
        }
    }

    /// Transform a gateway request to Anthropic's format
    fn transform_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let messages = request
            .conversation()
            .into_iter()
            .map(|turn| {
                let mut content = Vec::new();
                if let Some(image) = turn.image {
                    content.push(AnthropicBlock::Image {
                        source: AnthropicImageSource {
                            source_type: "base64",
                            media_type: image.mime_type.clone(),
                            data: image.data.clone(),
                        },
                    });
                }
                if !turn.text.is_empty() {
                    content.push(AnthropicBlock::Text {
                        text: turn.text.to_string(),
                    });
                }
                AnthropicMessage {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content,
                }
            })
            .collect();

        AnthropicRequest {
            model: self.resolve_model(request),
            max_tokens: request
                .max_tokens
                .or(self.config.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_prompt.clone(),
            messages,
            temperature: request.temperature.or(self.config.temperature),
            stream,
        }
    }

    /// Map one streaming event
    fn handle_event(provider: &str, event: &crate::sse::SseEvent) -> GatewayResult<SseAction> {
        let Ok(data) = serde_json::from_str::<AnthropicStreamEvent>(&event.data) else {
            return Ok(SseAction::Skip);
        };

        match data.event_type.as_str() {
            "content_block_delta" => Ok(data
                .delta
                .and_then(|d| d.text)
                .filter(|t| !t.is_empty())
                .map_or(SseAction::Skip, SseAction::Fragment)),
            "message_stop" => Ok(SseAction::Done),
            "error" => {
                let error = data.error.unwrap_or_default();
                if error.error_type == "rate_limit_error" {
                    Err(GatewayError::rate_limited(provider, None))
                } else {
                    Err(GatewayError::provider(provider, error.message, None))
                }
            }
            _ => Ok(SseAction::Skip),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
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
            .authorized(self.client.post(self.endpoint()))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.id(), error = %e, "Anthropic API request failed");
                http::transport_error(self.id(), &e, self.config.timeout)
            })?;

        if !response.status().is_success() {
            return Err(http::error_from_response(self.id(), response, self.config.timeout).await);
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| {
            GatewayError::provider(self.id(), format!("Invalid response JSON: {e}"), None)
        })?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<String>();

        Ok(CompletionResult::success(
            text,
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
            .authorized(self.client.post(self.endpoint()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.id(), error = %e, "Anthropic streaming request failed");
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

// Anthropic API Types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicError>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}
