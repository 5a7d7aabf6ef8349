//! Global atomic counters for pyexplain.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. before the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    decodes: AtomicU64,
    knowledge_misses: AtomicU64,
    safe_runs: AtomicU64,
    safe_run_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            decodes: AtomicU64::new(0),
            knowledge_misses: AtomicU64::new(0),
            safe_runs: AtomicU64::new(0),
            safe_run_failures: AtomicU64::new(0),
        }
    }

    /// Increment the decodes counter by one.
    pub fn inc_decodes(&self) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decodes", "counter incremented");
    }

    /// Increment the knowledge-base miss counter by one.
    pub fn inc_knowledge_misses(&self) {
        self.knowledge_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "knowledge_misses", "counter incremented");
    }

    pub fn inc_safe_runs(&self) {
        self.safe_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "safe_runs", "counter incremented");
    }

    pub fn inc_safe_run_failures(&self) {
        self.safe_run_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "safe_run_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            decodes = self.decodes(),
            knowledge_misses = self.knowledge_misses(),
            safe_runs = self.safe_runs(),
            safe_run_failures = self.safe_run_failures(),
        );
    }

    pub fn decodes(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn knowledge_misses(&self) -> u64 {
        self.knowledge_misses.load(Ordering::Relaxed)
    }

    pub fn safe_runs(&self) -> u64 {
        self.safe_runs.load(Ordering::Relaxed)
    }

    pub fn safe_run_failures(&self) -> u64 {
        self.safe_run_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.decodes.store(0, Ordering::Relaxed);
        self.knowledge_misses.store(0, Ordering::Relaxed);
        self.safe_runs.store(0, Ordering::Relaxed);
        self.safe_run_failures.store(0, Ordering::Relaxed);
    }
}
