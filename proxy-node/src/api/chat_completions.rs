//! `POST /v1/completions` and `POST /v1/chat/completions` (Dialect-O).

use crate::api::auth::{AuthResult, authenticate};
use crate::api::support::{auth_error_response, error_response, insert_correlation_header, new_correlation_id, processor_config};
use crate::core::error::NodeError;
use crate::core::metrics::RequestOutcome;
use crate::core::processor;
use crate::core::state::SharedState;
use crate::streaming;
use crate::transform::{ResponseLimits, dialect_o, enforce_response_limits};
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use proxy_types::domain::dialect::DialectFormat;
use serde_json::Value;
use std::time::Instant;

pub async fn completions(state: State<SharedState>, headers: HeaderMap, body: Json<Value>) -> Response {
    handle(state, headers, body, "/v1/completions").await
}

pub async fn chat_completions(state: State<SharedState>, headers: HeaderMap, body: Json<Value>) -> Response {
    handle(state, headers, body, "/v1/chat/completions").await
}

async fn handle(State(state): State<SharedState>, headers: HeaderMap, Json(body): Json<Value>, path: &str) -> Response {
    let correlation_id = new_correlation_id();

    if !matches!(authenticate(&headers, &state.config.proxy_api_key), AuthResult::Success) {
        return auth_error_response(DialectFormat::DialectO, &correlation_id);
    }

    state.metrics.begin_request();
    let start = Instant::now();

    let config = processor_config(&state);
    let processed = match processor::process(&correlation_id, &body, path, &headers, &config) {
        Ok(p) => p,
        Err(err) => {
            state.metrics.end_request(RequestOutcome::Failure, elapsed_ms(start), 0);
            return error_response(DialectFormat::DialectO, err, &correlation_id);
        }
    };

    let Some(client) = state.client_for(processed.routing_decision.provider) else {
        state.metrics.end_request(RequestOutcome::Failure, elapsed_ms(start), 0);
        return error_response(DialectFormat::DialectO, NodeError::Configuration("backend not configured".into()), &correlation_id);
    };

    let provider = processed.routing_decision.provider;
    let public_model_label = processed.normalized_request.model.clone();

    if processed.normalized_request.stream {
        let request = processed.upstream_request.clone();
        let stream_result = state
            .breaker
            .call(provider, NodeError::is_breaker_expected, || async move { client.send_stream(&request).await })
            .await;

        let upstream_stream = match stream_result {
            Ok(s) => s,
            Err(err) => {
                state.metrics.end_request(RequestOutcome::Failure, elapsed_ms(start), 0);
                return error_response(DialectFormat::DialectO, err, &correlation_id);
            }
        };

        state.metrics.end_request(RequestOutcome::Success, elapsed_ms(start), 0);
        let frames = streaming::translate(DialectFormat::DialectO, processed.conversation_id, public_model_label, upstream_stream, correlation_id.clone());
        let sse = Sse::new(streaming::into_sse_stream(frames)).keep_alive(KeepAlive::default());
        let mut response = sse.into_response();
        insert_correlation_header(&mut response, &correlation_id);
        return response;
    }

    let request = processed.upstream_request.clone();
    let unary_result = state
        .breaker
        .call(provider, NodeError::is_breaker_expected, || async move { client.send_unary(&request).await })
        .await;

    let upstream_response = match unary_result {
        Ok(r) => r,
        Err(err) => {
            state.metrics.end_request(RequestOutcome::Failure, elapsed_ms(start), 0);
            return error_response(DialectFormat::DialectO, err, &correlation_id);
        }
    };

    let response_body = dialect_o::from_upstream_unary(&upstream_response, &public_model_label);
    let limits = ResponseLimits {
        max_response_size: state.config.max_response_size,
        max_completion_length: state.config.max_completion_length,
        max_choices_count: state.config.max_choices_count,
    };
    if let Err(err) = enforce_response_limits(&response_body, &upstream_response.text(), 1, &limits) {
        state.metrics.end_request(RequestOutcome::Failure, elapsed_ms(start), 0);
        return error_response(DialectFormat::DialectO, err, &correlation_id);
    }

    let elapsed = elapsed_ms(start);
    state.multi_turn.record_turn(&processed.conversation_id, &processed.normalized_request, &upstream_response, elapsed, &correlation_id);
    state.metrics.end_request(RequestOutcome::Success, elapsed, upstream_response.usage.total_tokens as u64);

    let mut response = (StatusCode::OK, Json(response_body)).into_response();
    insert_correlation_header(&mut response, &correlation_id);
    response
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, Config, Environment, RouteEntry};
    use crate::core::state::AppState;
    use axum::http::HeaderValue;
    use proxy_types::domain::dialect::Provider;
    use proxy_types::domain::effort::ReasoningEffort;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            port: 8080,
            environment: Environment::Test,
            proxy_api_key: "x".repeat(32),
            primary: BackendConfig { endpoint: "https://example.test/v1".into(), api_key: "y".repeat(32), model: "backend-a".into() },
            secondary: None,
            upstream_timeout: Duration::from_secs(120),
            upstream_max_retries: 3,
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

    fn authed_headers(state: &AppState) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&state.config.proxy_api_key).unwrap());
        headers
    }

    #[tokio::test]
    async fn rejects_request_with_no_credentials() {
        let state: SharedState = std::sync::Arc::new(AppState::new(config()).unwrap());
        let body = json!({"model": "gpt-5-codex", "messages": [{"role": "user", "content": "hi"}]});
        let response = chat_completions(State(state), HeaderMap::new(), Json(body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-correlation-id"));
    }

    #[tokio::test]
    async fn rejects_unsupported_model_with_client_error() {
        let state: SharedState = std::sync::Arc::new(AppState::new(config()).unwrap());
        let headers = authed_headers(&state);
        let body = json!({"model": "no-such-model", "messages": [{"role": "user", "content": "hi"}]});
        let response = chat_completions(State(state), headers, Json(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn completions_endpoint_shares_the_same_handler() {
        let state: SharedState = std::sync::Arc::new(AppState::new(config()).unwrap());
        let headers = authed_headers(&state);
        let body = json!({"model": "no-such-model", "prompt": "hi"});
        let response = completions(State(state), headers, Json(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
