//! Process-wide atomic counters for reqflow observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. from a liveness probe).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free atomic counters.
pub struct Metrics {
    requests_analyzed: AtomicU64,
    component_invocations: AtomicU64,
    degradations_applied: AtomicU64,
    validator_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            requests_analyzed: AtomicU64::new(0),
            component_invocations: AtomicU64::new(0),
            degradations_applied: AtomicU64::new(0),
            validator_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_requests(&self) {
        self.requests_analyzed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests_analyzed", "counter incremented");
    }

    pub fn inc_invocations(&self) {
        self.component_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "component_invocations", "counter incremented");
    }

    pub fn inc_degradations(&self) {
        self.degradations_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "degradations_applied", "counter incremented");
    }

    pub fn inc_validator_retries(&self) {
        self.validator_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "validator_retries", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            requests_analyzed = self.requests_analyzed(),
            component_invocations = self.component_invocations(),
            degradations_applied = self.degradations_applied(),
            validator_retries = self.validator_retries(),
        );
    }

    pub fn requests_analyzed(&self) -> u64 {
        self.requests_analyzed.load(Ordering::Relaxed)
    }

    pub fn component_invocations(&self) -> u64 {
        self.component_invocations.load(Ordering::Relaxed)
    }

    pub fn degradations_applied(&self) -> u64 {
        self.degradations_applied.load(Ordering::Relaxed)
    }

    pub fn validator_retries(&self) -> u64 {
        self.validator_retries.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.requests_analyzed.store(0, Ordering::Relaxed);
        self.component_invocations.store(0, Ordering::Relaxed);
        self.degradations_applied.store(0, Ordering::Relaxed);
        self.validator_retries.store(0, Ordering::Relaxed);
    }
}
