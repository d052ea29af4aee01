//! Bidirectional translation between the two client-facing dialects and the
//! unified upstream dialect. The two dialects form a closed set, so each
//! direction is a pair of transform functions (`dialect_a`, `dialect_o`)
//! dispatched on the tagged `NormalizedRequest`/response format rather than
//! a class hierarchy.

pub mod dialect_a;
pub mod dialect_o;
pub mod sanitize;

use crate::core::error::NodeError;
use proxy_types::domain::dialect::{NormalizedRequest, RoutingDecision, UpstreamInput, UpstreamMessage, UpstreamRequest};
use proxy_types::domain::effort::ReasoningEffort;
use proxy_types::error::ErrorKind;

/// Shared request-side construction: both dialects flatten to the same
/// Dialect-R shape once the request has been normalized.
pub(crate) fn build_upstream_request(
    request: &NormalizedRequest,
    routing: &RoutingDecision,
    reasoning_effort: ReasoningEffort,
    previous_response_id: Option<String>,
) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(UpstreamMessage { role: "system".to_string(), content: system.clone() });
    }
    for message in &request.messages {
        messages.push(UpstreamMessage { role: message.role.as_str().to_string(), content: message.content.concat_text() });
    }

    UpstreamRequest {
        model: routing.backend_model.clone(),
        input: UpstreamInput::Messages(messages),
        reasoning_effort,
        previous_response_id,
        max_output_tokens: request.sampling.max_output_tokens,
        temperature: request.sampling.temperature,
        top_p: request.sampling.top_p,
        tools: request.tools.clone(),
        stream: request.stream,
    }
}

pub struct ResponseLimits {
    pub max_response_size: usize,
    pub max_completion_length: usize,
    pub max_choices_count: usize,
}

/// Post-translation integrity check, applied before emission.
pub fn enforce_response_limits(body: &serde_json::Value, completion_text: &str, choices_count: usize, limits: &ResponseLimits) -> Result<(), NodeError> {
    let serialized_len = serde_json::to_vec(body).map(|b| b.len()).unwrap_or(usize::MAX);
    if serialized_len > limits.max_response_size {
        return Err(NodeError::ResponseSizeViolation(format!("response exceeds {} bytes", limits.max_response_size)));
    }
    if completion_text.len() > limits.max_completion_length {
        return Err(NodeError::ResponseSizeViolation(format!("completion exceeds {} characters", limits.max_completion_length)));
    }
    if choices_count > limits.max_choices_count {
        return Err(NodeError::ResponseSizeViolation(format!("choice count exceeds {}", limits.max_choices_count)));
    }
    Ok(())
}

/// RFC3339 timestamp stamped onto every error envelope.
pub(crate) fn error_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The `type` string surfaced in a dialect error envelope for a given kind.
pub fn error_type_string(kind: &ErrorKind) -> String {
    match kind {
        ErrorKind::InvalidRequest { .. } | ErrorKind::UnsupportedModel { .. } => "invalid_request_error".to_string(),
        ErrorKind::AuthenticationFailure => "authentication_error".to_string(),
        ErrorKind::RateLimited => "rate_limit_error".to_string(),
        ErrorKind::UpstreamClientError { upstream_type } | ErrorKind::UpstreamServerError { upstream_type } => upstream_type.clone(),
        ErrorKind::NetworkError
        | ErrorKind::NetworkTimeout
        | ErrorKind::CircuitOpen { .. }
        | ErrorKind::ResponseSizeViolation
        | ErrorKind::Internal => "api_error".to_string(),
    }
}
