//! Derives a reasoning-effort tier from request shape and, when available,
//! conversation history signals.

use proxy_types::domain::dialect::NormalizedRequest;
use proxy_types::domain::effort::{Complexity, ReasoningEffort};

const COMPLEX_DOMAIN_KEYWORDS: &[&str] =
    &["architecture", "distributed", "event sourcing", "cqrs", "algorithm", "debug"];

/// Signals carried over from the Conversation Manager, when a prior state
/// exists for this request's key.
#[derive(Default, Clone, Copy)]
pub struct HistorySignals {
    pub message_count: usize,
    pub total_tokens: u64,
}

pub struct AnalyzerConfig {
    pub default_reasoning_effort: ReasoningEffort,
    pub domain_boost_keywords: Vec<String>,
    pub domain_boost_enabled: bool,
}

/// Computes the reasoning-effort tier for a request, given an optional
/// complexity classification and history signals.
pub fn analyze(
    request: &NormalizedRequest,
    complexity: Option<Complexity>,
    history: HistorySignals,
    config: &AnalyzerConfig,
) -> ReasoningEffort {
    let base = base_tier(complexity, config.default_reasoning_effort);
    let mut bump: u8 = 0;

    if history.message_count >= 20 || history.total_tokens >= 25_000 {
        bump += 2;
    } else if history.message_count >= 10 || history.total_tokens >= 8_000 {
        bump += 1;
    }

    if !request.tools.is_empty() {
        bump += 1;
    }

    let user_text = request.user_text();
    if user_text.len() > 4_000 {
        bump += 1;
    }
    if contains_fenced_code_block(&user_text) {
        bump += 1;
    }
    if contains_any_keyword(&user_text, COMPLEX_DOMAIN_KEYWORDS) {
        bump += 1;
    }

    let mut tier = base.bump(bump);

    if config.domain_boost_enabled && contains_any_keyword(&user_text, &config.domain_boost_keywords) {
        tier = match tier {
            ReasoningEffort::Minimal => ReasoningEffort::Low,
            ReasoningEffort::Medium => ReasoningEffort::High,
            other => other,
        };
    }

    tier
}

/// `simple → defaultReasoningEffort` (rather than `low`); `medium →
/// medium`, `complex → high`; absent context also falls back to the
/// configured default.
fn base_tier(complexity: Option<Complexity>, default_reasoning_effort: ReasoningEffort) -> ReasoningEffort {
    match complexity {
        None => default_reasoning_effort,
        Some(Complexity::Simple) => default_reasoning_effort,
        Some(Complexity::Medium) => ReasoningEffort::Medium,
        Some(Complexity::Complex) => ReasoningEffort::High,
    }
}

fn contains_fenced_code_block(text: &str) -> bool {
    text.matches("```").count() >= 2
}

fn contains_any_keyword(text: &str, keywords: &[impl AsRef<str>]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.as_ref().to_lowercase()))
}
