//! End-to-end tests for the AI provider gateway.
//!
//! These tests drive the full HTTP stack:
//! - Rate limiting in front of the router
//! - Fallback across real adapters talking to mock provider servers
//! - Server-Sent-Events streaming
//! - Operational endpoints

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use gateway_config::{GatewayConfig, ProviderSettings};
use gateway_core::ProviderType;
use gateway_server::{create_router, AppState};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Provider entry pointed at a mock server
fn provider(id: &str, provider_type: ProviderType, priority: u32, base_url: &str) -> ProviderSettings {
    let mut settings = ProviderSettings::new(id, provider_type, priority);
    settings.api_key = Some(SecretString::new("test-key".to_string()));
    settings.base_url = Some(base_url.to_string());
    settings
}

/// Gateway with Anthropic (rank 1) and OpenAI (rank 2) backed by mocks
fn create_app(anthropic: &MockServer, openai: &MockServer) -> Router {
    create_app_with(anthropic, openai, |_| {})
}

fn create_app_with(
    anthropic: &MockServer,
    openai: &MockServer,
    customize: impl FnOnce(&mut GatewayConfig),
) -> Router {
    let mut config = GatewayConfig::default();
    config.providers = vec![
        provider("anthropic", ProviderType::Anthropic, 1, &anthropic.uri()),
        provider("openai", ProviderType::OpenAI, 2, &openai.uri()),
    ];
    customize(&mut config);

    let state = AppState::from_config(config).expect("state");
    create_router(state)
}

fn completion_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer client-key")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn mount_anthropic_reply(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-latest",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })))
        .mount(server)
        .await;
}

async fn mount_openai_reply(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_failure(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(json!({"error": {"message": "upstream unavailable"}})),
        )
        .mount(server)
        .await;
}

mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_priority_one_provider_answers() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_anthropic_reply(&anthropic, "Hello from Claude").await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["provider"], "anthropic");
        assert_eq!(json["text"], "Hello from Claude");
        assert!(openai.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_on_provider_error() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_failure(&anthropic, 500).await;
        mount_openai_reply(&openai, "Hello from GPT").await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["provider"], "openai");
        assert_eq!(json["text"], "Hello from GPT");
        assert_eq!(json["attempts"], 2);
    }

    #[tokio::test]
    async fn test_exhaustion_is_a_structured_200() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_failure(&anthropic, 500).await;
        mount_failure(&openai, 502).await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "AllProvidersExhausted");
        assert_eq!(json["provider"], "none");
    }

    #[tokio::test]
    async fn test_empty_request_rejected_before_provider_contact() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&anthropic)
            .await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions", &json!({"history": []})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "InvalidRequest");
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let response = create_app(&anthropic, &openai)
            .oneshot(request)
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn test_image_skips_text_only_provider() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&anthropic)
            .await;
        mount_openai_reply(&openai, "A small red square").await;
        let app = create_app_with(&anthropic, &openai, |config| {
            config.providers[0].image_input = false;
        });

        let body = json!({
            "prompt": "describe",
            "image": {"mimeType": "image/png", "data": "iVBORw0KGgo="}
        });
        let response = app
            .clone()
            .oneshot(completion_request("/completions", &body))
            .await
            .expect("response");

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["provider"], "openai");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/providers")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let providers = body_json(response).await;
        assert_eq!(providers[0]["capabilities"]["imageInput"], false);
        assert_eq!(providers[0]["health"]["state"], "healthy");
    }

    #[tokio::test]
    async fn test_invalid_credential_rejected() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        let app = create_app_with(&anthropic, &openai, |config| {
            config.auth.api_keys = vec![SecretString::new("valid-key".to_string())];
        });

        let response = app
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

mod rate_limit_tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_enforced_per_client() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_anthropic_reply(&anthropic, "ok").await;
        let app = create_app_with(&anthropic, &openai, |config| {
            config.rate_limit.max_requests = 2;
        });

        for expected_remaining in ["1", "0"] {
            let response = app
                .clone()
                .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()["x-ratelimit-remaining"].to_str().ok(),
                Some(expected_remaining)
            );
        }

        let response = app
            .clone()
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "LocalRateLimitExceeded");
        assert!(json["resetAt"].is_string());
        assert_eq!(anthropic.received_requests().await.map(|r| r.len()), Some(2));
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_anthropic_reply(&anthropic, "ok").await;
        let app = create_app_with(&anthropic, &openai, |config| {
            config.rate_limit.max_requests = 1;
        });

        let first = app
            .clone()
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let other_client = Request::builder()
            .method(Method::POST)
            .uri("/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer another-client")
            .body(Body::from(json!({"prompt": "hello"}).to_string()))
            .expect("request");
        let second = app.oneshot(other_client).await.expect("response");
        assert_eq!(second.status(), StatusCode::OK);
    }
}

mod streaming_tests {
    use super::*;

    const ANTHROPIC_STREAM: &str = concat!(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}\n\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    );

    async fn mount_stream(server: &MockServer, body: &'static str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_stream_requires_credential() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&anthropic)
            .await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/completions/stream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"prompt": "hello"}).to_string()))
            .expect("request");
        let response = create_app(&anthropic, &openai)
            .oneshot(request)
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stream_delivers_fragments_then_done() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_stream(&anthropic, ANTHROPIC_STREAM).await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions/stream", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().ok(),
            Some("text/event-stream")
        );

        let body = body_text(response).await;
        let data: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .collect();
        assert_eq!(
            data,
            vec![
                r#"{"content":"Hel"}"#,
                r#"{"content":"lo"}"#,
                r#"{"content":" world"}"#,
                "[DONE]",
            ]
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_emits_error_event() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_stream(
            &anthropic,
            concat!(
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"partial\"}}\n\n",
                "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
            ),
        )
        .await;
        mount_openai_reply(&openai, "should not be used").await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions/stream", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        let body = body_text(response).await;
        let data: Vec<Value> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|payload| serde_json::from_str(payload).expect("json event"))
            .collect();

        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["content"], "partial");
        assert_eq!(data[1]["error"]["kind"], "StreamInterrupted");
        assert!(!body.contains("[DONE]"));
        assert!(openai.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_stream_falls_back_before_first_fragment() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_failure(&anthropic, 529).await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(concat!(
                        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"from gpt\"}}]}\n\n",
                        "data: [DONE]\n\n",
                    )),
            )
            .mount(&openai)
            .await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions/stream", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        let body = body_text(response).await;
        assert!(body.contains(r#"data: {"content":"from gpt"}"#));
        assert!(body.contains("data: [DONE]"));
    }

    #[tokio::test]
    async fn test_stream_exhaustion_returns_json() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_failure(&anthropic, 500).await;
        mount_failure(&openai, 500).await;

        let response = create_app(&anthropic, &openai)
            .oneshot(completion_request("/completions/stream", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["errorKind"], "AllProvidersExhausted");
        assert_eq!(json["provider"], "none");
    }
}

mod operational_tests {
    use super::*;

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn test_health() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;

        let response = create_app(&anthropic, &openai)
            .oneshot(get("/health"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_with_configured_providers() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;

        let response = create_app(&anthropic, &openai)
            .oneshot(get("/ready"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["configured_providers"], 2);
    }

    #[tokio::test]
    async fn test_providers_listing_reflects_health() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_failure(&anthropic, 500).await;
        mount_openai_reply(&openai, "ok").await;
        let app = create_app(&anthropic, &openai);

        app.clone()
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        let response = app.oneshot(get("/providers")).await.expect("response");
        let json = body_json(response).await;
        let providers = json.as_array().expect("array");

        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0]["id"], "anthropic");
        assert_eq!(providers[0]["priority"], 1);
        assert_eq!(providers[0]["health"]["state"], "degraded");
        assert_eq!(providers[1]["health"]["state"], "healthy");
    }

    #[tokio::test]
    async fn test_metrics_after_request() {
        let anthropic = MockServer::start().await;
        let openai = MockServer::start().await;
        mount_anthropic_reply(&anthropic, "ok").await;
        let app = create_app(&anthropic, &openai);

        app.clone()
            .oneshot(completion_request("/completions", &json!({"prompt": "hello"})))
            .await
            .expect("response");

        let response = app.oneshot(get("/metrics")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains(r#"gateway_requests_total{endpoint="completions",outcome="success"} 1"#));
        assert!(text.contains("gateway_provider_attempts_total"));
    }
}
