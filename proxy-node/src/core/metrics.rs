use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters surfaced by `GET /health` and consulted by
/// operators; updated on the hot path with relaxed/SeqCst atomics only,
/// never a lock.
#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_succeeded: AtomicU64,
    pub requests_failed: AtomicU64,
    pub tokens_processed: AtomicU64,
    pub current_active_requests: AtomicU64,
    pub total_response_time_ms: AtomicU64,
    pub peak_concurrent_requests: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of request handling. Returns a guard that
    /// decrements the active count and records success/failure on drop
    /// unless explicitly finished.
    pub fn begin_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let active = self.current_active_requests.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_concurrent_requests.fetch_max(active, Ordering::Relaxed);
    }

    pub fn end_request(&self, outcome: RequestOutcome, elapsed_ms: u64, tokens: u64) {
        self.current_active_requests.fetch_sub(1, Ordering::Relaxed);
        self.total_response_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.tokens_processed.fetch_add(tokens, Ordering::Relaxed);
        match outcome {
            RequestOutcome::Success => {
                self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Failure => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn avg_response_time_ms(&self) -> u64 {
        let total = self.requests_succeeded.load(Ordering::Relaxed) + self.requests_failed.load(Ordering::Relaxed);
        if total == 0 {
            0
        } else {
            self.total_response_time_ms.load(Ordering::Relaxed) / total
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_concurrency() {
        let metrics = Metrics::new();
        metrics.begin_request();
        metrics.begin_request();
        assert_eq!(metrics.peak_concurrent_requests.load(Ordering::Relaxed), 2);
        metrics.end_request(RequestOutcome::Success, 10, 5);
        assert_eq!(metrics.current_active_requests.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.peak_concurrent_requests.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn computes_average_response_time() {
        let metrics = Metrics::new();
        metrics.begin_request();
        metrics.end_request(RequestOutcome::Success, 100, 10);
        metrics.begin_request();
        metrics.end_request(RequestOutcome::Failure, 300, 0);
        assert_eq!(metrics.avg_response_time_ms(), 200);
    }
}
