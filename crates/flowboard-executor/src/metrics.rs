//! Executor metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use flowboard_queue::QueueStats;

use crate::state::ExecutorState;

/// Executor metrics.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    /// Total execution attempts started.
    pub total_executed: AtomicU64,

    /// Total successful completions.
    pub total_completed: AtomicU64,

    /// Total terminal failures.
    pub total_failed: AtomicU64,

    /// Total attempts that were returned for retry.
    pub total_retries: AtomicU64,

    /// Total executions force-failed by timeout.
    pub total_timeouts: AtomicU64,

    /// Total poll-loop faults survived.
    pub poll_errors: AtomicU64,

    /// Accumulated execution time of completed instructions (milliseconds).
    execution_time_ms: AtomicU64,

    /// Start time.
    start_time: parking_lot::RwLock<Option<Instant>>,
}

impl ExecutorMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of the executor.
    pub fn mark_start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Record the start of an execution attempt.
    pub fn record_executed(&self) {
        self.total_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful completion.
    pub fn record_completed(&self, duration_ms: u64) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);
        self.execution_time_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// Record a terminal failure.
    pub fn record_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an attempt returned for retry.
    pub fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timeout.
    pub fn record_timeout(&self) {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a survived poll-loop fault.
    pub fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self, state: ExecutorState, queue: QueueStats) -> ExecutorStats {
        let completed = self.total_completed.load(Ordering::Relaxed);
        let execution_time_ms = self.execution_time_ms.load(Ordering::Relaxed);
        ExecutorStats {
            state,
            total_executed: self.total_executed.load(Ordering::Relaxed),
            total_completed: completed,
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            avg_execution_ms: if completed == 0 {
                0.0
            } else {
                execution_time_ms as f64 / completed as f64
            },
            queue_size: queue.total_items,
            uptime_secs: self.uptime_secs(),
            queue,
        }
    }
}

/// Snapshot of executor statistics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub state: ExecutorState,
    pub total_executed: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub total_timeouts: u64,
    pub poll_errors: u64,
    /// Streaming mean execution time of completed instructions.
    pub avg_execution_ms: f64,
    /// Mirrored from the queue's own stats.
    pub queue_size: usize,
    pub uptime_secs: u64,
    /// Full queue snapshot taken at the same time.
    pub queue: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowboard_queue::StatusCounts;

    fn empty_queue_stats() -> QueueStats {
        QueueStats {
            counts: StatusCounts::default(),
            total_items: 0,
            avg_wait_ms: 0.0,
            avg_execution_ms: 0.0,
            uptime_secs: 0,
        }
    }

    #[test]
    fn test_metrics_counts() {
        let metrics = ExecutorMetrics::new();
        metrics.record_executed();
        metrics.record_executed();
        metrics.record_completed(100);
        metrics.record_retry();
        metrics.record_failed();

        let snapshot = metrics.snapshot(ExecutorState::Running, empty_queue_stats());
        assert_eq!(snapshot.total_executed, 2);
        assert_eq!(snapshot.total_completed, 1);
        assert_eq!(snapshot.total_retries, 1);
        assert_eq!(snapshot.total_failed, 1);
    }

    #[test]
    fn test_avg_execution() {
        let metrics = ExecutorMetrics::new();
        let snapshot = metrics.snapshot(ExecutorState::Stopped, empty_queue_stats());
        assert_eq!(snapshot.avg_execution_ms, 0.0);

        metrics.record_completed(100);
        metrics.record_completed(300);
        let snapshot = metrics.snapshot(ExecutorState::Running, empty_queue_stats());
        assert_eq!(snapshot.avg_execution_ms, 200.0);
    }

    #[test]
    fn test_uptime_starts_at_zero() {
        let metrics = ExecutorMetrics::new();
        assert_eq!(metrics.uptime_secs(), 0);
        metrics.mark_start();
        assert!(metrics.uptime_secs() < 2);
    }
}
