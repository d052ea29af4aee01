//! Dialect-O (flat chat-completions) transform functions.

use super::{build_upstream_request, sanitize};
use proxy_types::domain::dialect::{NormalizedRequest, RoutingDecision, UpstreamRequest, UpstreamResponse};
use proxy_types::domain::effort::ReasoningEffort;
use proxy_types::error::ProxyError;
use serde_json::{Value, json};

pub fn to_upstream_request(
    request: &NormalizedRequest,
    routing: &RoutingDecision,
    reasoning_effort: ReasoningEffort,
    previous_response_id: Option<String>,
) -> UpstreamRequest {
    build_upstream_request(request, routing, reasoning_effort, previous_response_id)
}

/// Builds the unary Dialect-O response body. `public_model_label`
/// is the model name echoed back to the client (the originally requested
/// alias).
pub fn from_upstream_unary(response: &UpstreamResponse, public_model_label: &str) -> Value {
    let text = sanitize::redact(&response.text());
    json!({
        "id": response.id,
        "object": "chat.completion",
        "created": response.created,
        "model": public_model_label,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": map_finish_reason(response.finish_reason.as_deref()),
        }],
        "usage": {
            "prompt_tokens": response.usage.prompt_tokens,
            "completion_tokens": response.usage.completion_tokens,
            "total_tokens": response.usage.total_tokens,
        },
    })
}

/// `stop -> stop`, `length -> length`, `content_filter -> content_filter`;
/// anything else (including absent) passes through as `"stop"`, the safest
/// default for a dialect that always expects a terminal reason.
fn map_finish_reason(finish_reason: Option<&str>) -> Value {
    match finish_reason {
        Some(r @ ("stop" | "length" | "content_filter")) => json!(r),
        _ => json!("stop"),
    }
}

pub fn opening_chunk(id: &str, created: u64, public_model_label: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": public_model_label,
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": Value::Null}],
    })
}

pub fn delta_chunk(id: &str, created: u64, public_model_label: &str, text: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": public_model_label,
        "choices": [{"index": 0, "delta": {"content": sanitize::redact(text)}, "finish_reason": Value::Null}],
    })
}

pub fn terminal_chunk(id: &str, created: u64, public_model_label: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": public_model_label,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
    })
}

pub fn error_envelope(err: &ProxyError) -> Value {
    json!({
        "error": {"type": super::error_type_string(&err.kind), "message": sanitize::redact(&err.message)},
        "correlationId": err.correlation_id,
        "timestamp": super::error_timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_types::domain::message::TokenUsage;

    fn response(text: &str, finish_reason: Option<&str>) -> UpstreamResponse {
        UpstreamResponse {
            id: "r1".into(),
            created: 1000,
            model: "backend-a".into(),
            output: vec![proxy_types::domain::dialect::OutputItem::Text { text: text.into() }],
            usage: TokenUsage { prompt_tokens: 2, completion_tokens: 1, total_tokens: 3, reasoning_tokens: None },
            finish_reason: finish_reason.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn builds_chat_completion_body() {
        let body = from_upstream_unary(&response("Hello", Some("stop")), "gpt-4o");
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn passes_through_length_finish_reason() {
        let body = from_upstream_unary(&response("x", Some("length")), "m");
        assert_eq!(body["choices"][0]["finish_reason"], "length");
    }
}
