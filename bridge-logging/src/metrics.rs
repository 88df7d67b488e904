//! Process-wide request counters
//!
//! Plain atomics, read by `GET /health`. There is no exporter.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every request path
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    requests: AtomicU64,
    searches: AtomicU64,
    dispatches: AtomicU64,
    unsupported_operations: AtomicU64,
    no_context_rejections: AtomicU64,
    downstream_failures: AtomicU64,
    dropped_search_lines: AtomicU64,
    stream_sessions: AtomicU64,
    stream_conflicts: AtomicU64,
}

/// Point-in-time copy of [`BridgeMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub searches: u64,
    pub dispatches: u64,
    pub unsupported_operations: u64,
    pub no_context_rejections: u64,
    pub downstream_failures: u64,
    pub dropped_search_lines: u64,
    pub stream_sessions: u64,
    pub stream_conflicts: u64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search(&self, dropped_lines: usize) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.dropped_search_lines
            .fetch_add(dropped_lines as u64, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unsupported_operation(&self) {
        self.unsupported_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_context(&self) {
        self.no_context_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downstream_failure(&self) {
        self.downstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_opened(&self) {
        self.stream_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_conflict(&self) {
        self.stream_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            unsupported_operations: self.unsupported_operations.load(Ordering::Relaxed),
            no_context_rejections: self.no_context_rejections.load(Ordering::Relaxed),
            downstream_failures: self.downstream_failures.load(Ordering::Relaxed),
            dropped_search_lines: self.dropped_search_lines.load(Ordering::Relaxed),
            stream_sessions: self.stream_sessions.load(Ordering::Relaxed),
            stream_conflicts: self.stream_conflicts.load(Ordering::Relaxed),
        }
    }
}

static METRICS: once_cell::sync::Lazy<BridgeMetrics> = once_cell::sync::Lazy::new(BridgeMetrics::new);

/// Get the global metrics instance
pub fn get_metrics() -> &'static BridgeMetrics {
    &METRICS
}
