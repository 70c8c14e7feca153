//! Google Gemini provider implementation.
//!
//! Supports Gemini models via the Google AI Studio API.
//!
//! # API Format
//! - `https://generativelanguage.googleapis.com/v1beta/models/{MODEL}:generateContent`
//! - `...:streamGenerateContent?alt=sse` for server-sent events

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
use tracing::{debug, error, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini provider implementation
pub struct GoogleProvider {
    config: AdapterConfig,
    client: Client,
    capabilities: ProviderCapabilities,
    base_url: String,
}

impl GoogleProvider {
    /// Create a new Google provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or the base URL is invalid
    pub fn new(config: AdapterConfig) -> GatewayResult<Self> {
        let base_url = config.base_url_or(DEFAULT_BASE_URL);
        Url::parse(&base_url).map_err(|e| {
            GatewayError::configuration(format!("Invalid Gemini base URL '{base_url}': {e}"))
        })?;

        let client = http::build_client()?;

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

    /// Build the endpoint URL for a model
    fn endpoint_url(&self, model: &str, streaming: bool) -> GatewayResult<Url> {
        let action = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        let mut url = Url::parse(&format!("{}/models/{model}:{action}", self.base_url))
            .map_err(|e| GatewayError::internal(format!("Invalid Gemini endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if streaming {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", self.config.api_key_str());
        }
        Ok(url)
    }

    fn ensure_configured(&self) -> GatewayResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(GatewayError::provider(self.id(), "provider not configured", None))
        }
    }

    /// Transform a gateway request to Google's format
    fn transform_request(&self, request: &CompletionRequest) -> GoogleRequest {
        let contents = request
            .conversation()
            .into_iter()
            .map(Self::transform_turn)
            .collect();

        // Gemini uses system_instruction for system messages
        let system_instruction = request
            .system_prompt
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|text| GoogleContent {
                role: None,
                parts: vec![GooglePart::Text {
                    text: text.to_string(),
                }],
            });

        let generation_config = GoogleGenerationConfig {
            temperature: request.temperature.or(self.config.temperature),
            max_output_tokens: request.max_tokens.or(self.config.max_tokens),
        };

        GoogleRequest {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
        }
    }

    fn transform_turn(turn: Turn<'_>) -> GoogleContent {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "model",
        };

        let mut parts = Vec::new();
        if let Some(image) = turn.image {
            parts.push(GooglePart::InlineData {
                inline_data: GoogleInlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.data.clone(),
                },
            });
        }
        if !turn.text.is_empty() || parts.is_empty() {
            parts.push(GooglePart::Text {
                text: turn.text.to_string(),
            });
        }

        GoogleContent {
            role: Some(role.to_string()),
            parts,
        }
    }

    /// Concatenate the text parts of the first candidate
    fn candidate_text(response: GoogleResponse) -> Option<String> {
        let candidate = response.candidates.into_iter().next()?;
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            warn!("Gemini candidate blocked by safety filters");
        }

        Some(
            candidate
                .content
                .map(|content| {
                    content
                        .parts
                        .into_iter()
                        .filter_map(|p| match p {
                            GooglePart::Text { text } => Some(text),
                            GooglePart::InlineData { .. } | GooglePart::Other(_) => None,
                        })
                        .collect::<String>()
                })
                .unwrap_or_default(),
        )
    }

    /// Map one streaming event
    fn handle_event(provider: &str, event: &SseEvent) -> GatewayResult<SseAction> {
        if let Some(message) = http::error_message(&event.data) {
            return Err(GatewayError::provider(provider, message, None));
        }

        let Ok(response) = serde_json::from_str::<GoogleResponse>(&event.data) else {
            return Ok(SseAction::Skip);
        };

        Ok(Self::candidate_text(response)
            .filter(|t| !t.is_empty())
            .map_or(SseAction::Skip, SseAction::Fragment))
    }
}

#[async_trait]
impl LLMProvider for GoogleProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
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

        let model = self.resolve_model(request);
        let url = self.endpoint_url(&model, false)?;
        let google_request = self.transform_request(request);

        debug!(provider = %self.id(), model = %model, "Sending completion request");

        let response = self
            .client
            .post(url)
            .timeout(self.config.timeout)
            .json(&google_request)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key
                let e = e.without_url();
                error!(provider = %self.id(), error = %e, "Google API request failed");
                http::transport_error(self.id(), &e, self.config.timeout)
            })?;

        if !response.status().is_success() {
            return Err(http::error_from_response(self.id(), response, self.config.timeout).await);
        }

        let google_response: GoogleResponse = response.json().await.map_err(|e| {
            GatewayError::provider(
                self.id(),
                format!("Invalid response JSON: {}", e.without_url()),
                None,
            )
        })?;

        let text = Self::candidate_text(google_response)
            .ok_or_else(|| GatewayError::provider(self.id(), "No candidates in response", None))?;

        Ok(CompletionResult::success(text, self.id(), model))
    }

    async fn stream(&self, request: &CompletionRequest) -> GatewayResult<FragmentStream> {
        self.ensure_configured()?;
        self.check_capabilities(request)?;

        let model = self.resolve_model(request);
        let url = self.endpoint_url(&model, true)?;
        let google_request = self.transform_request(request);

        debug!(provider = %self.id(), model = %model, "Sending streaming request");

        let response = self
            .client
            .post(url)
            .json(&google_request)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key
                let e = e.without_url();
                error!(provider = %self.id(), error = %e, "Google API streaming request failed");
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

// Google API Types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GooglePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GoogleInlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}
