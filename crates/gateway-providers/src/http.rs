//! HTTP plumbing shared by the adapters.

use crate::sse::{SseDecoder, SseEvent};
use async_stream::try_stream;
use futures::StreamExt;
use gateway_core::{FragmentStream, GatewayError, GatewayResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, trace};

/// What an adapter makes of one SSE event
pub(crate) enum SseAction {
    /// Emit a text fragment
    Fragment(String),
    /// Nothing to emit
    Skip,
    /// Clean end of stream
    Done,
}

/// Build the pooled HTTP client used by an adapter
pub(crate) fn build_client() -> GatewayResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(32)
        .build()
        .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))
}

/// Map a transport failure
pub(crate) fn transport_error(provider: &str, error: &reqwest::Error, timeout: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(provider, timeout)
    } else {
        GatewayError::provider(provider, format!("Request failed: {error}"), None)
    }
}

/// Turn a non-success response into a classified error
pub(crate) async fn error_from_response(
    provider: &str,
    response: Response,
    timeout: Duration,
) -> GatewayError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    trace!(provider = %provider, status = status, body = %body, "Provider error response");
    classify_status(provider, status, retry_after, &body, timeout)
}

/// Classify an upstream HTTP status
pub(crate) fn classify_status(
    provider: &str,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
    timeout: Duration,
) -> GatewayError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        400 | 422 => GatewayError::invalid_request(message, None),
        408 | 504 => GatewayError::timeout(provider, timeout),
        429 => GatewayError::rate_limited(provider, retry_after),
        _ => GatewayError::provider(provider, message, Some(status)),
    }
}

/// Extract `error.message` (or a top-level `message`) from an error body
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .or_else(|| value["error"].as_str())
        .map(str::to_string)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Decode an SSE response body into text fragments.
///
/// Fragments are yielded as soon as the chunk carrying them is decoded.
pub(crate) fn sse_fragments<F>(provider: String, response: Response, mut handle: F) -> FragmentStream
where
    F: FnMut(&SseEvent) -> GatewayResult<SseAction> + Send + 'static,
{
    let stream = try_stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| {
                GatewayError::provider(provider.as_str(), format!("Stream error: {e}"), None)
            })?;

            let events = decoder
                .feed(&chunk)
                .map_err(|e| GatewayError::provider(provider.as_str(), e.to_string(), None))?;
            for event in events {
                match handle(&event)? {
                    SseAction::Fragment(text) => yield text,
                    SseAction::Skip => {}
                    SseAction::Done => {
                        debug!(provider = %provider, "Stream completed");
                        return;
                    }
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if let SseAction::Fragment(text) = handle(&event)? {
                yield text;
            }
        }
        debug!(provider = %provider, "Stream ended");
    };

    Box::pin(stream)
}
