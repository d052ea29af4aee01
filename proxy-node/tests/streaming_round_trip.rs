//! End-to-end SSE streaming round trip: a real upstream emitting a
//! Dialect-R event stream, translated by the running proxy into
//! client-dialect SSE frames.

use axum::http::header;
use axum::routing::post;
use axum::Router;
use proxy_node::api::create_router;
use proxy_node::config::{BackendConfig, Config, Environment, RouteEntry};
use proxy_node::core::state::AppState;
use proxy_types::domain::dialect::Provider;
use proxy_types::domain::effort::ReasoningEffort;
use std::sync::Arc;
use std::time::Duration;

const PROXY_KEY: &str = "proxy-test-key-0123456789012345";

const UPSTREAM_SSE_BODY: &str = concat!(
    "data: {\"id\":\"c1\",\"object\":\"response.chunk\",\"output\":[{\"type\":\"text\",\"text\":\"Hel\"}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"response.chunk\",\"output\":[{\"type\":\"text\",\"text\":\"lo\"}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"response.chunk\",\"output\":[{\"type\":\"reasoning\",\"status\":\"completed\"}],",
    "\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":2,\"total_tokens\":4},\"finish_reason\":\"stop\"}\n\n",
    "data: [DONE]\n\n",
);

async fn spawn_mock_upstream() -> String {
    let app = Router::new().route(
        "/v1/responses",
        post(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], UPSTREAM_SSE_BODY) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/responses")
}

fn test_config(upstream_endpoint: String) -> Config {
    Config {
        port: 0,
        environment: Environment::Test,
        proxy_api_key: PROXY_KEY.to_string(),
        primary: BackendConfig { endpoint: upstream_endpoint, api_key: "upstream-key-01234567890123".into(), model: "backend-a".into() },
        secondary: None,
        upstream_timeout: Duration::from_secs(5),
        upstream_max_retries: 0,
        default_reasoning_effort: ReasoningEffort::Medium,
        enable_content_security_validation: true,
        max_request_size: 1_000_000,
        max_response_size: 1_000_000,
        max_completion_length: 100_000,
        max_choices_count: 16,
        max_conversation_age: Duration::from_secs(300),
        max_stored_conversations: 10_000,
        max_history_length: 50,
        max_history_age: Duration::from_secs(300),
        max_concurrent_conversations: 1_000,
        breaker_failure_threshold: 3,
        breaker_recovery_timeout: Duration::from_secs(1),
        breaker_max_backoff: Duration::from_secs(60),
        routing_table: vec![RouteEntry { provider: Provider::Primary, backend_model: "backend-a".into(), aliases: vec!["gpt-5-codex".into()] }],
    }
}

async fn spawn_proxy(state: Arc<AppState>) -> String {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn dialect_a_stream_emits_ordered_sse_frames_ending_in_message_stop() {
    let upstream_url = spawn_mock_upstream().await;
    let state = Arc::new(AppState::new(test_config(upstream_url)).unwrap());
    let base = spawn_proxy(state).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/v1/messages"))
        .header("x-api-key", PROXY_KEY)
        .json(&serde_json::json!({
            "model": "gpt-5-codex",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
            "stream": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    let event_types: Vec<String> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| {
            let v: serde_json::Value = serde_json::from_str(data).unwrap();
            v["type"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(
        event_types,
        vec!["message_start", "content_block_start", "content_block_delta", "content_block_delta", "content_block_stop", "message_stop"]
    );
}

#[tokio::test]
async fn dialect_o_stream_ends_with_done_sentinel() {
    let upstream_url = spawn_mock_upstream().await;
    let state = Arc::new(AppState::new(test_config(upstream_url)).unwrap());
    let base = spawn_proxy(state).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/v1/chat/completions"))
        .header("x-api-key", PROXY_KEY)
        .json(&serde_json::json!({
            "model": "gpt-5-codex",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.trim_end().ends_with("data: [DONE]"));
}
