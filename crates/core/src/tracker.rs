//! Cumulative latency per storage operation.
//!
//! One tracker lives for the whole daemon process. Every provider call adds
//! its elapsed time here and the shutdown handler logs the [`LatencySummary`].

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Storage operations that are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Artifact upload
    Save,
    /// Artifact download
    Get,
    /// Single-object removal
    Delete,
    /// Enumeration for retention
    List,
}

impl Operation {
    /// Every tracked operation, in summary order.
    pub const ALL: [Self; 4] = [Self::Save, Self::Get, Self::Delete, Self::List];

    /// Lowercase name used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Get => "get",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Save => 0,
            Self::Get => 1,
            Self::Delete => 2,
            Self::List => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Counter {
    total_ms: AtomicU64,
    calls: AtomicU64,
}

/// Process-wide latency accumulator, safe to share across runtime threads.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    counters: [Counter; 4],
}

impl LatencyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` to the running total for `op`.
    pub fn record(&self, op: Operation, elapsed: Duration) {
        let counter = &self.counters[op.index()];
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        counter.total_ms.fetch_add(ms, Ordering::Relaxed);
        counter.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Start timing `op`; the returned timer records when finished or dropped.
    #[must_use]
    pub fn start(&self, op: Operation) -> OperationTimer<'_> {
        OperationTimer {
            tracker: self,
            op,
            started: Instant::now(),
            recorded: false,
        }
    }

    /// Snapshot of the current totals.
    #[must_use]
    pub fn summary(&self) -> LatencySummary {
        let entries = Operation::ALL
            .iter()
            .map(|&op| {
                let counter = &self.counters[op.index()];
                OperationLatency {
                    operation: op,
                    total_ms: counter.total_ms.load(Ordering::Relaxed),
                    calls: counter.calls.load(Ordering::Relaxed),
                }
            })
            .collect();
        LatencySummary { entries }
    }
}

/// Guard returned by [`LatencyTracker::start`].
pub struct OperationTimer<'a> {
    tracker: &'a LatencyTracker,
    op: Operation,
    started: Instant,
    recorded: bool,
}

impl OperationTimer<'_> {
    /// Record the elapsed time now and return it.
    pub fn finish(mut self) -> Duration {
        let elapsed = self.started.elapsed();
        self.tracker.record(self.op, elapsed);
        self.recorded = true;
        elapsed
    }
}

impl Drop for OperationTimer<'_> {
    fn drop(&mut self) {
        // Covers calls abandoned by a cancelled future
        if !self.recorded {
            self.tracker.record(self.op, self.started.elapsed());
        }
    }
}

/// Accumulated latency for one operation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OperationLatency {
    /// Which operation
    pub operation: Operation,
    /// Sum of elapsed milliseconds
    pub total_ms: u64,
    /// Number of recorded calls
    pub calls: u64,
}

/// Point-in-time totals for every operation.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    /// One entry per [`Operation`], in [`Operation::ALL`] order
    pub entries: Vec<OperationLatency>,
}

impl LatencySummary {
    /// Total for a single operation.
    #[must_use]
    pub fn total_ms(&self, op: Operation) -> u64 {
        self.entries
            .iter()
            .find(|e| e.operation == op)
            .map_or(0, |e| e.total_ms)
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}={}ms ({} calls)", e.operation, e.total_ms, e.calls))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_accumulates() {
        let tracker = LatencyTracker::new();
        tracker.record(Operation::Save, Duration::from_millis(40));
        tracker.record(Operation::Save, Duration::from_millis(2));
        tracker.record(Operation::List, Duration::from_millis(7));

        let summary = tracker.summary();
        assert_eq!(summary.total_ms(Operation::Save), 42);
        assert_eq!(summary.total_ms(Operation::List), 7);
        assert_eq!(summary.total_ms(Operation::Get), 0);
        assert_eq!(summary.entries[0].calls, 2);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let tracker = LatencyTracker::new();
        {
            let _timer = tracker.start(Operation::Delete);
        }
        assert_eq!(tracker.summary().entries[2].calls, 1);
    }

    #[test]
    fn test_timer_finish_records_once() {
        let tracker = LatencyTracker::new();
        let timer = tracker.start(Operation::Get);
        let _ = timer.finish();
        assert_eq!(tracker.summary().entries[1].calls, 1);
    }

    #[test]
    fn test_concurrent_records() {
        let tracker = Arc::new(LatencyTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record(Operation::Get, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.summary().total_ms(Operation::Get), 800);
    }

    #[test]
    fn test_summary_display() {
        let tracker = LatencyTracker::new();
        tracker.record(Operation::Save, Duration::from_millis(5));
        let rendered = tracker.summary().to_string();
        assert!(rendered.starts_with("save=5ms (1 calls)"));
        assert!(rendered.contains("list=0ms (0 calls)"));
    }
}
