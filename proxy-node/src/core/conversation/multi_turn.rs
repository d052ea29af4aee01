//! Wraps the Conversation Manager to decide continuity (`previous_response_id`
//! attachment) and to record bounded per-conversation turn history.

use super::manager::{ConversationManager, TurnMetrics};
use proxy_types::domain::dialect::{NormalizedRequest, UpstreamResponse};
use proxy_types::domain::effort::Complexity;
use proxy_types::domain::message::TokenUsage;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct HistoryEntry {
    pub message_id: String,
    pub request_snapshot: NormalizedRequest,
    pub response_snapshot: UpstreamResponse,
    pub response_time_ms: u64,
    pub token_usage: TokenUsage,
    pub timestamp: Instant,
}

/// A normalized request augmented with the continuity decision.
pub struct EnhancedRequest {
    pub request: NormalizedRequest,
    pub previous_response_id: Option<String>,
}

pub struct MultiTurnResult {
    pub enhanced_request: EnhancedRequest,
    pub previous_response_id: Option<String>,
    pub should_use_previous: bool,
    pub history_length: usize,
    pub complexity: Complexity,
}

pub struct MultiTurnConfig {
    pub max_history_length: usize,
    pub max_history_age: Duration,
    pub max_concurrent_conversations: usize,
}

pub struct MultiTurnHandler {
    manager: Arc<ConversationManager>,
    config: MultiTurnConfig,
}

impl MultiTurnHandler {
    pub fn new(manager: Arc<ConversationManager>, config: MultiTurnConfig) -> Self {
        Self { manager, config }
    }

    pub fn process(&self, request: NormalizedRequest, key: &str, correlation_id: &str) -> MultiTurnResult {
        tracing::debug!(correlation_id, conversation_key = key, "resolving conversation continuity");
        let complexity = self.manager.analyze_complexity(key, &request);

        let (should_use_previous, previous_response_id, history_length) = match self.manager.lookup(key) {
            Some(state_lock) => {
                let state = state_lock.lock().expect("lock poisoned");
                let fresh_enough = Instant::now().duration_since(state.last_updated_at) <= self.config.max_history_age;
                let usable = state.is_active && fresh_enough;
                (
                    usable,
                    if usable { state.context.previous_response_id.clone() } else { None },
                    state.history.len(),
                )
            }
            None => (false, None, 0),
        };

        let enhanced_request = EnhancedRequest { previous_response_id: previous_response_id.clone(), request };

        MultiTurnResult { enhanced_request, previous_response_id, should_use_previous, history_length, complexity }
    }

    /// Appends a history entry, evicting the oldest once
    /// `max_history_length` is exceeded, and forwards aggregate metrics to
    /// the Conversation Manager.
    pub fn record_turn(
        &self,
        key: &str,
        request: &NormalizedRequest,
        response: &UpstreamResponse,
        response_time_ms: u64,
        correlation_id: &str,
    ) {
        tracing::debug!(
            correlation_id,
            conversation_key = key,
            response_time_ms,
            "recording conversation turn"
        );
        let state_lock = self.manager.get_or_create(key);
        {
            let mut state = state_lock.lock().expect("lock poisoned");
            state.history.push_back(HistoryEntry {
                message_id: response.id.clone(),
                request_snapshot: request.clone(),
                response_snapshot: response.clone(),
                response_time_ms,
                token_usage: response.usage.clone(),
                timestamp: Instant::now(),
            });
            while state.history.len() > self.config.max_history_length {
                state.history.pop_front();
            }
        }

        let is_error = response.error.is_some();
        self.manager.track(
            key,
            Some(response.id.clone()),
            Some(TurnMetrics {
                response_time_ms,
                total_tokens: response.usage.total_tokens as u64,
                reasoning_tokens: response.usage.reasoning_tokens.unwrap_or(0) as u64,
                is_error,
            }),
        );
    }

    /// Enforces age (via the Conversation Manager) and active-conversation
    /// caps. With no key, applies globally; with a key, trims only that
    /// conversation's history to the configured bound.
    pub fn cleanup_history(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                if let Some(state_lock) = self.manager.lookup(key) {
                    let mut state = state_lock.lock().expect("lock poisoned");
                    let mut removed = 0;
                    while state.history.len() > self.config.max_history_length {
                        state.history.pop_front();
                        removed += 1;
                    }
                    removed
                } else {
                    0
                }
            }
            None => {
                self.manager.cleanup_old() + self.manager.evict_active_to(self.config.max_concurrent_conversations)
            }
        }
    }

    /// Flips `isActive = false` without deleting the conversation's state or
    /// history.
    pub fn archive(&self, key: &str) -> bool {
        match self.manager.lookup(key) {
            Some(state_lock) => {
                state_lock.lock().expect("lock poisoned").is_active = false;
                true
            }
            None => false,
        }
    }

    pub fn max_concurrent_conversations(&self) -> usize {
        self.config.max_concurrent_conversations
    }

    pub fn stats(&self) -> MultiTurnStats {
        MultiTurnStats { conversation_count: self.manager.len() }
    }
}

pub struct MultiTurnStats {
    pub conversation_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::manager::ManagerConfig;
    use proxy_types::domain::dialect::{DialectFormat, MessageContent, MessageRole, NormalizedMessage, SamplingParams};

    fn handler() -> MultiTurnHandler {
        let manager = Arc::new(ConversationManager::new(ManagerConfig {
            max_conversation_age: Duration::from_secs(300),
            max_stored_conversations: 1_000,
        }));
        MultiTurnHandler::new(
            manager,
            MultiTurnConfig { max_history_length: 2, max_history_age: Duration::from_secs(300), max_concurrent_conversations: 100 },
        )
    }

    fn sample_request() -> NormalizedRequest {
        NormalizedRequest {
            format: DialectFormat::DialectA,
            model: "m".into(),
            messages: vec![NormalizedMessage { role: MessageRole::User, content: MessageContent::Text("hi".into()) }],
            system: None,
            sampling: SamplingParams::default(),
            stream: false,
            tools: vec![],
        }
    }

    fn sample_response(id: &str) -> UpstreamResponse {
        UpstreamResponse { id: id.into(), created: 0, model: "m".into(), output: vec![], usage: TokenUsage::default(), finish_reason: None, error: None }
    }

    #[test]
    fn first_turn_has_no_previous_response() {
        let handler = handler();
        let result = handler.process(sample_request(), "k1", "corr-1");
        assert!(!result.should_use_previous);
        assert_eq!(result.previous_response_id, None);
    }

    #[test]
    fn second_turn_uses_previous_response_id() {
        let handler = handler();
        handler.record_turn("k1", &sample_request(), &sample_response("r1"), 10, "corr-1");
        let result = handler.process(sample_request(), "k1", "corr-2");
        assert!(result.should_use_previous);
        assert_eq!(result.previous_response_id, Some("r1".to_string()));
    }

    #[test]
    fn history_is_capped_and_evicts_oldest() {
        let handler = handler();
        handler.record_turn("k1", &sample_request(), &sample_response("r1"), 10, "corr-1");
        handler.record_turn("k1", &sample_request(), &sample_response("r2"), 10, "corr-2");
        handler.record_turn("k1", &sample_request(), &sample_response("r3"), 10, "corr-3");
        let result = handler.process(sample_request(), "k1", "corr-4");
        assert_eq!(result.history_length, 2);
    }

    #[test]
    fn archive_flips_active_flag() {
        let handler = handler();
        handler.record_turn("k1", &sample_request(), &sample_response("r1"), 10, "corr-1");
        assert!(handler.archive("k1"));
        let result = handler.process(sample_request(), "k1", "corr-2");
        assert!(!result.should_use_previous);
    }

    #[test]
    fn cleanup_history_evicts_active_conversations_beyond_concurrency_cap() {
        let manager = Arc::new(ConversationManager::new(ManagerConfig {
            max_conversation_age: Duration::from_secs(300),
            max_stored_conversations: 1_000,
        }));
        let handler = MultiTurnHandler::new(
            Arc::clone(&manager),
            MultiTurnConfig { max_history_length: 10, max_history_age: Duration::from_secs(300), max_concurrent_conversations: 1 },
        );
        handler.record_turn("k1", &sample_request(), &sample_response("r1"), 10, "corr-1");
        std::thread::sleep(Duration::from_millis(5));
        handler.record_turn("k2", &sample_request(), &sample_response("r2"), 10, "corr-2");

        let removed = handler.cleanup_history(None);
        assert_eq!(removed, 1);
        let result = handler.process(sample_request(), "k1", "corr-3");
        assert!(!result.should_use_previous);
        let result = handler.process(sample_request(), "k2", "corr-4");
        assert!(result.should_use_previous);
    }
}
