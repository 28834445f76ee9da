// ═══════════════════════════════════════════════════════════════
// FETCH METRICS - Counting who showed up, who didn't, and who was late
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for one fetch batch. Every retrieval task holds an Arc to
// this, including the ones we stopped waiting for, so the counters have to
// be safe to bump from anywhere at any time. No locks, PURE ATOMICS.
//
// late_results is the interesting one: it counts tasks that finished after
// the orchestrator had already given up on them. Their documents go nowhere,
// but at least they get counted on the way out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// What gets serialized to JSON at the end of a run.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FetchMetricsSnapshot {
    pub sources_requested: u64,
    pub documents_collected: u64,
    pub retrieval_failures: u64,
    pub late_results: u64,
    pub deadline_hits: u64,
    pub uptime_ms: u64,
}

pub struct FetchMetrics {
    sources_requested: AtomicU64,
    documents_collected: AtomicU64,
    retrieval_failures: AtomicU64,
    late_results: AtomicU64,
    deadline_hits: AtomicU64,
    start_time: Instant,
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self {
            sources_requested: AtomicU64::new(0),
            documents_collected: AtomicU64::new(0),
            retrieval_failures: AtomicU64::new(0),
            late_results: AtomicU64::new(0),
            deadline_hits: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn add_requested(&self, n: u64) {
        self.sources_requested.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_collected(&self) {
        self.documents_collected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retrieval_failures(&self) {
        self.retrieval_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_late_results(&self) {
        self.late_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deadline_hits(&self) {
        self.deadline_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> FetchMetricsSnapshot {
        FetchMetricsSnapshot {
            sources_requested: self.sources_requested.load(Ordering::Relaxed),
            documents_collected: self.documents_collected.load(Ordering::Relaxed),
            retrieval_failures: self.retrieval_failures.load(Ordering::Relaxed),
            late_results: self.late_results.load(Ordering::Relaxed),
            deadline_hits: self.deadline_hits.load(Ordering::Relaxed),
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }
}
