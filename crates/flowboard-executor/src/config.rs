//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-execution timeout in milliseconds.
    ///
    /// Expiry forces the queue item to a failure outcome. This is
    /// best-effort: the underlying handler task is detached and may still
    /// be running; its late result is discarded.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    /// Interval between stats-updated events, in milliseconds.
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Capacity of the executor event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_execution_timeout_ms() -> u64 {
    300_000
}

fn default_stats_interval_ms() -> u64 {
    5_000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            execution_timeout_ms: default_execution_timeout_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ExecutorConfig {
    /// Get the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the execution timeout as a Duration.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Get the stats interval as a Duration.
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}
