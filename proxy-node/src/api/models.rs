//! `GET /v1/models`: the set of client-visible aliases.

use crate::api::auth::{AuthResult, authenticate};
use crate::api::support::{auth_error_response, new_correlation_id};
use crate::core::state::SharedState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use proxy_types::domain::dialect::DialectFormat;
use serde_json::{Value, json};

pub async fn list_models(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if !matches!(authenticate(&headers, &state.config.proxy_api_key), AuthResult::Success) {
        return auth_error_response(DialectFormat::DialectA, &new_correlation_id());
    }
    Json(models_body(&state)).into_response()
}

fn models_body(state: &SharedState) -> Value {
    let data: Vec<Value> = state.router.supported_aliases().iter().map(|alias| json!({"id": alias, "object": "model"})).collect();
    json!({"object": "list", "data": data})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, Config, Environment, RouteEntry};
    use crate::core::state::AppState;
    use proxy_types::domain::dialect::Provider;
    use proxy_types::domain::effort::ReasoningEffort;
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

    #[test]
    fn lists_configured_aliases() {
        let state: SharedState = std::sync::Arc::new(AppState::new(config()).unwrap());
        let body = models_body(&state);
        assert_eq!(body["data"][0]["id"], "gpt-5-codex");
    }
}
