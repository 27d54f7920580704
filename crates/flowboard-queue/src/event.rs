//! Queue transition events.
//!
//! One event is emitted per state transition, after the state lock is
//! released, over a broadcast channel. Consumers (dashboards, loggers)
//! subscribe via [`crate::WorkQueue::subscribe`]; a slow consumer lags
//! without blocking the queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::Priority;

/// A queue state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// An item was added.
    Enqueued {
        id: Uuid,
        priority: Priority,
        queue_size: usize,
    },

    /// An item moved to Processing. `wait_ms` is the Pending latency.
    Dequeued { id: Uuid, wait_ms: u64 },

    /// An item completed. `duration_ms` is the Processing latency.
    Completed { id: Uuid, duration_ms: u64 },

    /// A failed item was returned to Pending for another attempt.
    Retrying {
        id: Uuid,
        retry_count: u32,
        delay_ms: u64,
    },

    /// An item failed permanently.
    Failed {
        id: Uuid,
        error: String,
        retry_count: u32,
    },

    /// A pending item was cancelled.
    Cancelled { id: Uuid },

    /// The queue was emptied.
    Cleared { count: usize },
}

impl QueueEvent {
    /// The item this event concerns, if any.
    pub fn item_id(&self) -> Option<Uuid> {
        match self {
            QueueEvent::Enqueued { id, .. }
            | QueueEvent::Dequeued { id, .. }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Retrying { id, .. }
            | QueueEvent::Failed { id, .. }
            | QueueEvent::Cancelled { id } => Some(*id),
            QueueEvent::Cleared { .. } => None,
        }
    }

    /// Check if this event ends the item's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::Completed { .. } | QueueEvent::Failed { .. } | QueueEvent::Cancelled { .. }
        )
    }
}
