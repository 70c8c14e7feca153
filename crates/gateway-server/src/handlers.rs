//! HTTP request handlers for the gateway API.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::stream::StreamExt;
use gateway_core::{
    CompletionRequest, CompletionResult, ErrorKind, GatewayError, ProviderDescriptor, StreamEvent,
};
use gateway_resilience::{HealthSnapshot, RateLimitDecision};
use gateway_telemetry::Metrics;
use serde::Serialize;
use serde_json::json;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

use crate::{
    extractors::{rate_limit_key, ClientIp, Identity, JsonBody, OptionalIdentity},
    state::AppState,
};

/// Terminal SSE payload of a successful stream
pub const DONE_MARKER: &str = "[DONE]";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const ENDPOINT_COMPLETE: &str = "completions";
const ENDPOINT_STREAM: &str = "completions_stream";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

/// Liveness endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Readiness response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// `ready` or `not_ready`
    pub status: String,
    /// Adapters with credentials
    pub configured_providers: usize,
}

/// Readiness endpoint: ready once at least one adapter has credentials
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let configured = state.registry().configured_count();
    let (status, label) = if configured > 0 {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status,
        Json(ReadinessResponse {
            status: label.to_string(),
            configured_providers: configured,
        }),
    )
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}

/// Adapter descriptor with its current health
#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    /// Static description
    #[serde(flatten)]
    pub descriptor: ProviderDescriptor,
    /// Current health
    pub health: HealthSnapshot,
}

/// List adapters in fallback order
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    let health = state.router.health();
    let providers = state
        .registry()
        .descriptors()
        .into_iter()
        .map(|descriptor| {
            let snapshot = health.snapshot(&descriptor.id);
            ProviderStatus {
                descriptor,
                health: snapshot,
            }
        })
        .collect();

    Json(providers)
}

/// `POST /completions`
///
/// Exhaustion is a normal outcome and is answered with 200 and
/// `success: false`.
#[instrument(skip_all, fields(endpoint = ENDPOINT_COMPLETE))]
pub async fn completion(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    ClientIp(ip): ClientIp,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> Response {
    let key = rate_limit_key(identity.as_ref(), ip.as_deref());
    let decision = match admit(&state, &key, ENDPOINT_COMPLETE) {
        Ok(decision) => decision,
        Err(rejection) => return rejection,
    };

    let result = state.router.route(&request).await;
    state
        .metrics
        .record_request(ENDPOINT_COMPLETE, outcome_label(&result));
    info!(
        provider = %result.provider,
        success = result.success,
        attempts = result.attempts,
        "Completion finished"
    );

    let mut response = (result_status(&result), Json(result)).into_response();
    apply_rate_limit_headers(response.headers_mut(), decision.as_ref());
    response
}

/// `POST /completions/stream`
///
/// Requires a credential. Each fragment is sent as
/// `data: {"content": "..."}`; a successful stream ends with `data: [DONE]`
/// and a failed one with `data: {"error": {...}}`. Failures before the first
/// fragment are answered with a JSON result instead.
#[instrument(skip_all, fields(endpoint = ENDPOINT_STREAM))]
pub async fn stream_completion(
    State(state): State<AppState>,
    Identity(identity): Identity,
    JsonBody(request): JsonBody<CompletionRequest>,
) -> Response {
    let decision = match admit(&state, &identity.id, ENDPOINT_STREAM) {
        Ok(decision) => decision,
        Err(rejection) => return rejection,
    };

    let multiplexer = match state.router.route_stream(&request).await {
        Ok(multiplexer) => multiplexer,
        Err(result) => {
            state
                .metrics
                .record_request(ENDPOINT_STREAM, outcome_label(&result));
            let mut response = (result_status(&result), Json(result)).into_response();
            apply_rate_limit_headers(response.headers_mut(), decision.as_ref());
            return response;
        }
    };

    debug!(provider = %multiplexer.provider(), "Streaming response");
    let metrics = Arc::clone(&state.metrics);
    let events = multiplexer.map(move |event| Ok::<_, Infallible>(to_sse_event(event, &metrics)));

    let mut response = Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), decision.as_ref());
    response
}

fn to_sse_event(event: StreamEvent, metrics: &Metrics) -> Event {
    match event {
        StreamEvent::Fragment(content) => {
            Event::default().data(json!({ "content": content }).to_string())
        }
        StreamEvent::Error { kind, message } => {
            metrics.record_request(ENDPOINT_STREAM, kind.as_str());
            Event::default().data(
                json!({ "error": { "kind": kind, "message": message } }).to_string(),
            )
        }
        StreamEvent::Done(_) => {
            metrics.record_request(ENDPOINT_STREAM, "success");
            Event::default().data(DONE_MARKER)
        }
    }
}

/// Check the local limiter; the rejection is a ready-made 429 response
fn admit(
    state: &AppState,
    key: &str,
    endpoint: &str,
) -> Result<Option<RateLimitDecision>, Response> {
    let Some(limiter) = &state.limiter else {
        return Ok(None);
    };

    let decision = limiter.check(key);
    if decision.allowed {
        return Ok(Some(decision));
    }

    warn!(client = %key, reset_at = %decision.reset_at, "Local rate limit exceeded");
    state.metrics.record_rate_limited();
    state
        .metrics
        .record_request(endpoint, ErrorKind::LocalRateLimitExceeded.as_str());

    let result = CompletionResult::from_error(&GatewayError::LocalRateLimitExceeded {
        reset_at: decision.reset_at,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(result)).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, Some(&decision));
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after(Utc::now()).as_secs()),
    );
    Err(response)
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: Option<&RateLimitDecision>) {
    let Some(decision) = decision else {
        return;
    };
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

/// Transport status for a structured result
fn result_status(result: &CompletionResult) -> StatusCode {
    match result.error_kind {
        Some(ErrorKind::InvalidRequest) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}

fn outcome_label(result: &CompletionResult) -> &'static str {
    result.error_kind.map_or("success", |kind| kind.as_str())
}
