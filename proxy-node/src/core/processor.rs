//! Universal Request Processor: the single orchestration path from a raw
//! inbound body to a routed, Dialect-R-ready upstream request.

use crate::core::conversation::{ConversationManager, MultiTurnHandler};
use crate::core::detector;
use crate::core::error::NodeError;
use crate::core::normalize::{self, NormalizerConfig};
use crate::core::reasoning::{self, AnalyzerConfig, HistorySignals};
use crate::core::router::ModelRouter;
use crate::transform::{dialect_a, dialect_o};
use axum::http::HeaderMap;
use proxy_types::domain::dialect::{DialectFormat, NormalizedRequest, RoutingDecision, UpstreamRequest};
use proxy_types::domain::effort::{Complexity, ReasoningEffort};
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

pub struct ProcessedRequest {
    pub upstream_request: UpstreamRequest,
    pub routing_decision: RoutingDecision,
    pub request_format: DialectFormat,
    pub response_format: DialectFormat,
    pub conversation_id: String,
    pub correlation_id: String,
    pub complexity: Complexity,
    pub reasoning_effort: ReasoningEffort,
    pub normalized_request: NormalizedRequest,
    pub should_use_previous: bool,
}

pub struct ProcessorConfig<'a> {
    pub normalizer: NormalizerConfig,
    pub analyzer: AnalyzerConfig,
    pub start_time: SystemTime,
    pub manager: &'a ConversationManager,
    pub multi_turn: &'a MultiTurnHandler,
    pub router: &'a ModelRouter,
}

/// Runs the full pipeline: size check -> detect -> normalize ->
/// complexity/reasoning -> conversation id -> transform to Dialect-R ->
/// route. `correlation_id` is allocated by the caller (so it is available on
/// both the success and failure path for the `X-Correlation-ID` response
/// header). Validation failures surface as `NodeError::Invalid`/
/// `UnsupportedModel`; anything unexpected surfaces as `NodeError::Other`.
pub fn process(correlation_id: &str, body: &serde_json::Value, path: &str, headers: &HeaderMap, config: &ProcessorConfig<'_>) -> Result<ProcessedRequest, NodeError> {
    let serialized_len = serde_json::to_vec(body).map(|b| b.len()).unwrap_or(usize::MAX);
    if serialized_len > config.normalizer.max_request_size {
        return Err(NodeError::Invalid {
            field: Some("body".to_string()),
            message: format!("request exceeds maximum size of {} bytes", config.normalizer.max_request_size),
        });
    }

    let request_format = detector::detect(body, path).map_err(|message| NodeError::Invalid { field: None, message: message.to_string() })?;

    let normalized = normalize::normalize(body, request_format, &config.normalizer)?;

    let conversation_id = match explicit_conversation_key(headers) {
        Some(key) => key,
        None => synthesize_conversation_id(&normalized, config.start_time),
    };

    let multi_turn_result = config.multi_turn.process(normalized, &conversation_id, correlation_id);
    let complexity = multi_turn_result.complexity;

    let history = config
        .manager
        .metrics_for(&conversation_id)
        .map(|ctx| HistorySignals { message_count: ctx.message_count as usize, total_tokens: ctx.total_tokens_used })
        .unwrap_or_default();

    let reasoning_effort = reasoning::analyze(&multi_turn_result.enhanced_request.request, Some(complexity), history, &config.analyzer);

    let routing_decision = config.router.route(&multi_turn_result.enhanced_request.request.model)?;

    let upstream_request = match request_format {
        DialectFormat::DialectA => dialect_a::to_upstream_request(
            &multi_turn_result.enhanced_request.request,
            &routing_decision,
            reasoning_effort,
            multi_turn_result.previous_response_id.clone(),
        ),
        DialectFormat::DialectO => dialect_o::to_upstream_request(
            &multi_turn_result.enhanced_request.request,
            &routing_decision,
            reasoning_effort,
            multi_turn_result.previous_response_id.clone(),
        ),
    };

    Ok(ProcessedRequest {
        upstream_request,
        routing_decision,
        request_format,
        response_format: request_format,
        conversation_id,
        correlation_id: correlation_id.to_string(),
        complexity,
        reasoning_effort,
        normalized_request: multi_turn_result.enhanced_request.request,
        should_use_previous: multi_turn_result.should_use_previous,
    })
}

fn explicit_conversation_key(headers: &HeaderMap) -> Option<String> {
    for name in ["x-conversation-id", "conversation-id", "x-session-id"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Stable hash of the first user message's text, salted by the number of
/// whole seconds the process has been running: identical first-turn text
/// produces the same id within one process-second, and a different id once
/// the second rolls over.
fn synthesize_conversation_id(request: &NormalizedRequest, start_time: SystemTime) -> String {
    let first_user_text = request
        .messages
        .iter()
        .find(|m| m.role == proxy_types::domain::dialect::MessageRole::User)
        .map(|m| m.content.concat_text())
        .unwrap_or_default();
    let salt = start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0);

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    first_user_text.hash(&mut hasher);
    salt.hash(&mut hasher);
    format!("conv-{:x}", hasher.finish())
}
