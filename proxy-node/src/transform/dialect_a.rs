//! Dialect-A (message-list, content-block) transform functions.

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

/// Builds the unary Dialect-A response body. `public_model_label`
/// is the model name echoed back to the client (the originally requested
/// alias).
pub fn from_upstream_unary(response: &UpstreamResponse, public_model_label: &str) -> Value {
    let text = sanitize::redact(&response.text());
    json!({
        "id": response.id,
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": public_model_label,
        "stop_reason": map_stop_reason(response.finish_reason.as_deref()),
        "usage": {
            "input_tokens": response.usage.prompt_tokens,
            "output_tokens": response.usage.completion_tokens,
        },
    })
}

/// `stop -> end_turn`, `length -> max_tokens`, `content_filter -> end_turn`,
/// unknown -> `end_turn`, absent -> `null`.
fn map_stop_reason(finish_reason: Option<&str>) -> Value {
    match finish_reason {
        None => Value::Null,
        Some("stop") => json!("end_turn"),
        Some("length") => json!("max_tokens"),
        Some("content_filter") => json!("end_turn"),
        Some(_) => json!("end_turn"),
    }
}

pub fn message_start(id: &str, public_model_label: &str) -> Value {
    json!({
        "type": "message_start",
        "message": {"id": id, "type": "message", "role": "assistant", "model": public_model_label, "content": []},
    })
}

pub fn content_block_start(index: u32) -> Value {
    json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}})
}

pub fn content_block_delta(index: u32, text: &str) -> Value {
    json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": sanitize::redact(text)}})
}

pub fn content_block_stop(index: u32) -> Value {
    json!({"type": "content_block_stop", "index": index})
}

pub fn message_stop(prompt_tokens: u32, completion_tokens: u32) -> Value {
    json!({"type": "message_stop", "usage": {"input_tokens": prompt_tokens, "output_tokens": completion_tokens}})
}

pub fn error_envelope(err: &ProxyError) -> Value {
    json!({
        "type": "error",
        "error": {"type": super::error_type_string(&err.kind), "message": sanitize::redact(&err.message)},
        "correlationId": err.correlation_id,
        "timestamp": super::error_timestamp(),
    })
}
