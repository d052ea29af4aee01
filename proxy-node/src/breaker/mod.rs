//! Per-upstream circuit breaker: closed/open/half-open with an
//! expected-error filter and exponential backoff.

use crate::core::error::NodeError;
use proxy_types::domain::dialect::Provider;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

enum BreakerState {
    Closed { failure_count: u32 },
    Open { next_attempt_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

struct ProviderState {
    state: BreakerState,
    success_count: u32,
    current_backoff: Duration,
}

impl ProviderState {
    fn new(initial_backoff: Duration) -> Self {
        Self { state: BreakerState::Closed { failure_count: 0 }, success_count: 0, current_backoff: initial_backoff }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

pub struct CircuitBreaker {
    states: Mutex<HashMap<Provider, ProviderState>>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self { states: Mutex::new(HashMap::new()), config }
    }

    /// Runs `f` guarded by the breaker for `provider`. Rejects fast with
    /// `NodeError::CircuitOpen` without calling `f` when the breaker is open
    /// (or a half-open probe is already in flight). `is_expected` classifies
    /// which error variants count against the failure counter; others pass
    /// through without affecting breaker state.
    pub async fn call<F, Fut, T>(&self, provider: Provider, is_expected: impl Fn(&NodeError) -> bool, f: F) -> Result<T, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        self.admit(provider)?;
        let result = f().await;
        self.record_outcome(provider, &result, &is_expected);
        result
    }

    fn admit(&self, provider: Provider) -> Result<(), NodeError> {
        let now = Instant::now();
        let mut states = self.states.lock().expect("lock poisoned");
        let entry = states.entry(provider).or_insert_with(|| ProviderState::new(self.config.initial_backoff));

        match &mut entry.state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { next_attempt_at } => {
                if now >= *next_attempt_at {
                    entry.state = BreakerState::HalfOpen { probe_in_flight: true };
                    Ok(())
                } else {
                    let remaining = next_attempt_at.saturating_duration_since(now).as_millis() as u64;
                    Err(NodeError::CircuitOpen { next_attempt_ms: remaining })
                }
            }
            BreakerState::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    Err(NodeError::CircuitOpen { next_attempt_ms: 0 })
                } else {
                    *probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_outcome<T>(&self, provider: Provider, result: &Result<T, NodeError>, is_expected: &impl Fn(&NodeError) -> bool) {
        let mut states = self.states.lock().expect("lock poisoned");
        let entry = states.entry(provider).or_insert_with(|| ProviderState::new(self.config.initial_backoff));

        match result {
            Ok(_) => {
                entry.success_count += 1;
                entry.state = BreakerState::Closed { failure_count: 0 };
                entry.current_backoff = self.config.initial_backoff;
            }
            Err(err) => {
                if !is_expected(err) {
                    // Unexpected errors bypass the counter but clear an
                    // in-flight half-open probe claim so a subsequent
                    // request can try again.
                    if let BreakerState::HalfOpen { probe_in_flight } = &mut entry.state {
                        *probe_in_flight = false;
                    }
                    return;
                }
                match &mut entry.state {
                    BreakerState::Closed { failure_count } => {
                        *failure_count += 1;
                        if *failure_count >= self.config.failure_threshold {
                            entry.state = BreakerState::Open { next_attempt_at: Instant::now() + entry.current_backoff };
                        }
                    }
                    BreakerState::HalfOpen { .. } => {
                        entry.current_backoff = (entry.current_backoff * 2).min(self.config.max_backoff);
                        entry.state = BreakerState::Open { next_attempt_at: Instant::now() + entry.current_backoff };
                    }
                    BreakerState::Open { .. } => {}
                }
            }
        }
    }

    pub fn status(&self, provider: Provider) -> BreakerStatus {
        let states = self.states.lock().expect("lock poisoned");
        match states.get(&provider).map(|s| &s.state) {
            None | Some(BreakerState::Closed { .. }) => BreakerStatus::Closed,
            Some(BreakerState::Open { .. }) => BreakerStatus::Open,
            Some(BreakerState::HalfOpen { .. }) => BreakerStatus::HalfOpen,
        }
    }
}
