//! `GET /health`: liveness and a few operator-facing metrics. Outside
//! the core's scope, so this stays a thin status snapshot rather than a
//! dependency health check.

use crate::breaker::BreakerStatus;
use crate::core::state::SharedState;
use axum::Json;
use axum::extract::State;
use proxy_types::domain::dialect::Provider;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub active_requests: u64,
    pub avg_response_time_ms: u64,
    pub conversation_count: usize,
    pub primary_breaker: &'static str,
    pub secondary_breaker: Option<&'static str>,
    pub memory_bytes: Option<u64>,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        requests_total: state.metrics.requests_total.load(std::sync::atomic::Ordering::Relaxed),
        requests_succeeded: state.metrics.requests_succeeded.load(std::sync::atomic::Ordering::Relaxed),
        requests_failed: state.metrics.requests_failed.load(std::sync::atomic::Ordering::Relaxed),
        active_requests: state.metrics.current_active_requests.load(std::sync::atomic::Ordering::Relaxed),
        avg_response_time_ms: state.metrics.avg_response_time_ms(),
        conversation_count: state.multi_turn.stats().conversation_count,
        primary_breaker: breaker_status_str(state.breaker.status(Provider::Primary)),
        secondary_breaker: state.secondary_client.as_ref().map(|_| breaker_status_str(state.breaker.status(Provider::Secondary))),
        memory_bytes: approximate_memory_usage(),
    })
}

fn breaker_status_str(status: BreakerStatus) -> &'static str {
    match status {
        BreakerStatus::Closed => "closed",
        BreakerStatus::Open => "open",
        BreakerStatus::HalfOpen => "half_open",
    }
}

/// Reads resident set size from `/proc/self/statm` (Linux only); absent
/// elsewhere or if unreadable.
fn approximate_memory_usage() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}
