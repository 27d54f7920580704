//! Queue statistics snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::Priority;

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Snapshot of queue statistics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Counts per status.
    pub counts: StatusCounts,

    /// Total stored items (all statuses).
    pub total_items: usize,

    /// Mean Pending -> Processing latency over all dequeues.
    pub avg_wait_ms: f64,

    /// Mean Processing -> Completed duration over all completions.
    pub avg_execution_ms: f64,

    /// Seconds since the queue was created.
    pub uptime_secs: u64,
}

/// Summary of one pending item for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItemInfo {
    pub id: Uuid,
    pub priority: Priority,
    /// Milliseconds since the item was enqueued.
    pub age_ms: u64,
    /// Ids of unsatisfied dependencies.
    pub blocked_on: Vec<Uuid>,
    pub tags: Vec<String>,
}

/// Current queue contents overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Total stored items.
    pub size: usize,

    /// Configured capacity.
    pub max_size: usize,

    /// Pending items, highest priority first, oldest first within a priority.
    pub pending: Vec<PendingItemInfo>,
}
