//! Bounded, keyed registry of conversation state: previous upstream
//! response id, rolling token/latency metrics, and age/capacity eviction.

use axum::http::HeaderMap;
use proxy_types::domain::dialect::NormalizedRequest;
use proxy_types::domain::effort::Complexity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const COMPLEX_DOMAIN_KEYWORDS: &[&str] =
    &["architecture", "distributed", "event sourcing", "cqrs", "algorithm", "debug"];

#[derive(Clone)]
pub struct ConversationContext {
    pub key: String,
    pub message_count: u64,
    pub previous_response_id: Option<String>,
    pub total_tokens_used: u64,
    pub reasoning_tokens_used: u64,
    pub average_response_time_ms: f64,
    pub error_count: u64,
    pub last_touched: Instant,
    pub task_complexity: Complexity,
}

pub struct ConversationState {
    pub key: String,
    pub is_active: bool,
    pub created_at: Instant,
    pub last_updated_at: Instant,
    pub context: ConversationContext,
    pub history: std::collections::VecDeque<super::multi_turn::HistoryEntry>,
}

/// Metrics attached to a recorded turn; errors and token usage feed the
/// complexity estimator.
pub struct TurnMetrics {
    pub response_time_ms: u64,
    pub total_tokens: u64,
    pub reasoning_tokens: u64,
    pub is_error: bool,
}

pub struct ManagerConfig {
    pub max_conversation_age: Duration,
    pub max_stored_conversations: usize,
}

pub struct ConversationManager {
    states: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
    config: ManagerConfig,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self { states: RwLock::new(HashMap::new()), config, cleanup_task: Mutex::new(None) }
    }

    /// Starts the background age-sweep task on the given interval if it
    /// isn't already running. Idempotent: a second call while the task is
    /// live is a no-op.
    pub fn start_cleanup_timer(self: &Arc<Self>, interval: Duration) {
        let mut task = self.cleanup_task.lock().expect("lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let manager = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.cleanup_old();
            }
        }));
    }

    /// Stops the background age-sweep task if running. Idempotent: a call
    /// with no task running is a no-op.
    pub fn stop(&self) {
        if let Some(handle) = self.cleanup_task.lock().expect("lock poisoned").take() {
            handle.abort();
        }
    }

    /// Priority: `x-conversation-id` > `conversation-id` > `x-session-id` >
    /// `conv-<correlationId>`. Empty header values are ignored.
    pub fn extract_key(headers: &HeaderMap, correlation_id: &str) -> String {
        for name in ["x-conversation-id", "conversation-id", "x-session-id"] {
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                let value = value.trim();
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
        format!("conv-{correlation_id}")
    }

    /// Returns the state for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<Mutex<ConversationState>> {
        if let Some(existing) = self.states.read().expect("lock poisoned").get(key) {
            return existing.clone();
        }
        let mut write_guard = self.states.write().expect("lock poisoned");
        write_guard
            .entry(key.to_string())
            .or_insert_with(|| {
                let now = Instant::now();
                Arc::new(Mutex::new(ConversationState {
                    key: key.to_string(),
                    is_active: true,
                    created_at: now,
                    last_updated_at: now,
                    context: ConversationContext {
                        key: key.to_string(),
                        message_count: 0,
                        previous_response_id: None,
                        total_tokens_used: 0,
                        reasoning_tokens_used: 0,
                        average_response_time_ms: 0.0,
                        error_count: 0,
                        last_touched: now,
                        task_complexity: Complexity::Medium,
                    },
                    history: std::collections::VecDeque::new(),
                }))
            })
            .clone()
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<Mutex<ConversationState>>> {
        self.states.read().expect("lock poisoned").get(key).cloned()
    }

    pub fn track(&self, key: &str, response_id: Option<String>, metrics: Option<TurnMetrics>) {
        let entry = self.get_or_create(key);
        {
            let mut state = entry.lock().expect("lock poisoned");
            let ctx = &mut state.context;
            ctx.message_count += 1;
            if let Some(id) = response_id {
                ctx.previous_response_id = Some(id);
            }
            if let Some(metrics) = metrics {
                let n = ctx.message_count as f64;
                ctx.average_response_time_ms =
                    ((ctx.average_response_time_ms * (n - 1.0)) + metrics.response_time_ms as f64) / n;
                ctx.total_tokens_used += metrics.total_tokens;
                ctx.reasoning_tokens_used += metrics.reasoning_tokens;
                if metrics.is_error {
                    ctx.error_count += 1;
                }
            }
            let now = Instant::now();
            ctx.last_touched = now;
            state.last_updated_at = now;
        }
        self.enforce_capacity();
    }

    pub fn previous_response_id_for(&self, key: &str) -> Option<String> {
        self.lookup(key)?.lock().expect("lock poisoned").context.previous_response_id.clone()
    }

    pub fn metrics_for(&self, key: &str) -> Option<ConversationContext> {
        Some(self.lookup(key)?.lock().expect("lock poisoned").context.clone())
    }

    /// simple if message count < 5 AND total tokens < 2000 AND no tools;
    /// complex if message count > 10 OR total tokens > 20000 OR error
    /// count > 3 OR average response time > 10000ms OR complex-domain
    /// keywords detected; else medium.
    pub fn analyze_complexity(&self, key: &str, request: &NormalizedRequest) -> Complexity {
        let Some(state) = self.lookup(key) else {
            return if request.tools.is_empty() { Complexity::Simple } else { Complexity::Medium };
        };
        let ctx = state.lock().expect("lock poisoned").context.clone();
        let has_keywords = contains_complex_keywords(&request.user_text());

        if ctx.message_count > 10
            || ctx.total_tokens_used > 20_000
            || ctx.error_count > 3
            || ctx.average_response_time_ms > 10_000.0
            || has_keywords
        {
            return Complexity::Complex;
        }
        if ctx.message_count < 5 && ctx.total_tokens_used < 2_000 && request.tools.is_empty() {
            return Complexity::Simple;
        }
        Complexity::Medium
    }

    /// Deletes entries whose `lastUpdatedAt` is older than
    /// `max_conversation_age`. Returns the number removed.
    pub fn cleanup_old(&self) -> usize {
        let now = Instant::now();
        let mut states = self.states.write().expect("lock poisoned");
        let before = states.len();
        states.retain(|_, state| {
            let last_updated = state.lock().expect("lock poisoned").last_updated_at;
            now.duration_since(last_updated) <= self.config.max_conversation_age
        });
        before - states.len()
    }

    /// Evicts oldest-by-`lastUpdatedAt` while the registry exceeds
    /// `max_stored_conversations`.
    pub fn enforce_capacity(&self) {
        let mut states = self.states.write().expect("lock poisoned");
        if states.len() <= self.config.max_stored_conversations {
            return;
        }
        let mut entries: Vec<(String, Instant)> = states
            .iter()
            .map(|(k, v)| (k.clone(), v.lock().expect("lock poisoned").last_updated_at))
            .collect();
        entries.sort_by_key(|(_, last_updated)| *last_updated);
        let excess = states.len() - self.config.max_stored_conversations;
        for (key, _) in entries.into_iter().take(excess) {
            states.remove(&key);
        }
    }

    /// Archives (flips `isActive = false`, keeping history) oldest-by-
    /// `lastUpdatedAt` active conversations while more than `max_active`
    /// are currently active. Returns the number archived.
    pub fn evict_active_to(&self, max_active: usize) -> usize {
        let states = self.states.read().expect("lock poisoned");
        let mut active: Vec<(String, Instant)> = states
            .iter()
            .filter_map(|(k, v)| {
                let state = v.lock().expect("lock poisoned");
                state.is_active.then(|| (k.clone(), state.last_updated_at))
            })
            .collect();
        if active.len() <= max_active {
            return 0;
        }
        active.sort_by_key(|(_, last_updated)| *last_updated);
        let excess = active.len() - max_active;
        for (key, _) in active.into_iter().take(excess) {
            if let Some(state) = states.get(&key) {
                state.lock().expect("lock poisoned").is_active = false;
            }
        }
        excess
    }

    pub fn len(&self) -> usize {
        self.states.read().expect("lock poisoned").len()
    }
}

fn contains_complex_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLEX_DOMAIN_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn manager() -> ConversationManager {
        ConversationManager::new(ManagerConfig {
            max_conversation_age: Duration::from_secs(300),
            max_stored_conversations: 2,
        })
    }

    #[test]
    fn extract_key_prefers_conversation_id_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-conversation-id", HeaderValue::from_static("conv-a"));
        headers.insert("x-session-id", HeaderValue::from_static("sess-b"));
        assert_eq!(ConversationManager::extract_key(&headers, "corr-1"), "conv-a");
    }

    #[test]
    fn extract_key_falls_back_to_correlation_id() {
        let headers = HeaderMap::new();
        assert_eq!(ConversationManager::extract_key(&headers, "corr-1"), "conv-corr-1");
    }

    #[test]
    fn track_increments_message_count_and_averages_response_time() {
        let mgr = manager();
        mgr.track("k", Some("r1".into()), Some(TurnMetrics { response_time_ms: 100, total_tokens: 10, reasoning_tokens: 0, is_error: false }));
        mgr.track("k", Some("r2".into()), Some(TurnMetrics { response_time_ms: 300, total_tokens: 10, reasoning_tokens: 0, is_error: false }));
        let ctx = mgr.metrics_for("k").unwrap();
        assert_eq!(ctx.message_count, 2);
        assert_eq!(ctx.previous_response_id, Some("r2".to_string()));
        assert_eq!(ctx.average_response_time_ms, 200.0);
    }

    #[test]
    fn enforce_capacity_evicts_oldest() {
        let mgr = manager();
        mgr.track("a", None, None);
        std::thread::sleep(Duration::from_millis(5));
        mgr.track("b", None, None);
        std::thread::sleep(Duration::from_millis(5));
        mgr.track("c", None, None);
        assert_eq!(mgr.len(), 2);
        assert!(mgr.lookup("a").is_none());
        assert!(mgr.lookup("c").is_some());
    }

    #[test]
    fn evict_active_to_archives_oldest_active_conversations() {
        let mgr = manager();
        mgr.track("a", None, None);
        std::thread::sleep(Duration::from_millis(5));
        mgr.track("b", None, None);

        let archived = mgr.evict_active_to(1);
        assert_eq!(archived, 1);
        assert!(!mgr.lookup("a").unwrap().lock().unwrap().is_active);
        assert!(mgr.lookup("b").unwrap().lock().unwrap().is_active);
        // Archiving keeps the entry (and its history) around, unlike cleanup_old.
        assert_eq!(mgr.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_timer_start_is_idempotent_and_stop_aborts_it() {
        let mgr = Arc::new(manager());
        mgr.start_cleanup_timer(Duration::from_millis(10));
        mgr.start_cleanup_timer(Duration::from_millis(10));
        mgr.stop();
        mgr.stop();
    }
}
