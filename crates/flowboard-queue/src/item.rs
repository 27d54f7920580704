//! Queue item definition and status.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QueueConfig;

/// Instruction priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    /// Low priority (background work).
    Low = 0,
    /// Normal priority.
    Normal = 1,
    /// High priority.
    High = 2,
    /// Critical priority (blocking work).
    Critical = 3,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// All priorities, highest first. Dequeue scans in this order.
    pub const ALL_DESC: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Queue item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting in queue.
    Pending,
    /// Currently being executed.
    Processing,
    /// Completed successfully.
    Completed,
    /// Failed permanently (retries exhausted).
    Failed,
    /// Cancelled before execution.
    Cancelled,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Pending
    }
}

impl ItemStatus {
    /// Check if this is a terminal status (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Processing => write!(f, "processing"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Failed => write!(f, "failed"),
            ItemStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An opaque unit of work submitted by a producer.
///
/// The queue never inspects `payload`; `source_id` is the producer's own
/// identifier (e.g. a story or sprint-plan id) and is only used by callers
/// to correlate queue items back to their domain objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    /// Producer-side identifier.
    pub source_id: String,
    /// Opaque payload, owned by the producer.
    pub payload: serde_json::Value,
}

impl Instruction {
    /// Create a new instruction.
    pub fn new(source_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source_id: source_id.into(),
            payload,
        }
    }
}

/// Options accepted by `enqueue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Item priority.
    #[serde(default)]
    pub priority: Priority,

    /// Maximum retries (queue default when None).
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Delay before a failed item becomes eligible again (queue default when None).
    #[serde(default)]
    pub retry_delay: Option<Duration>,

    /// Tags for lookup/grouping.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ids of items that must complete before this one is eligible.
    #[serde(default)]
    pub dependencies: HashSet<Uuid>,

    /// Producer's duration estimate.
    #[serde(default)]
    pub estimated_duration: Option<Duration>,

    /// Opaque producer metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EnqueueOptions {
    /// Create default options (normal priority, queue-level retry defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set maximum retries.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Set retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, id: Uuid) -> Self {
        self.dependencies.insert(id);
        self
    }

    /// Add several dependencies.
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.dependencies.extend(ids);
        self
    }

    /// Set the estimated duration.
    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    /// Set metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An instruction in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item id, assigned at enqueue time.
    pub id: Uuid,

    /// The instruction being scheduled.
    pub instruction: Instruction,

    /// Item priority.
    pub priority: Priority,

    /// Current status.
    pub status: ItemStatus,

    /// Number of retry attempts consumed.
    pub retry_count: u32,

    /// Maximum retries allowed.
    pub max_retries: u32,

    /// Delay before a failed item becomes eligible again.
    pub retry_delay: Duration,

    /// Items that must complete before this one is eligible.
    pub dependencies: HashSet<Uuid>,

    /// Tags for lookup/grouping.
    pub tags: Vec<String>,

    /// Enqueue time.
    pub added_at: DateTime<Utc>,

    /// When execution started (set on dequeue).
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed.
    pub completed_at: Option<DateTime<Utc>>,

    /// Producer's duration estimate.
    pub estimated_duration: Option<Duration>,

    /// Opaque producer metadata.
    pub metadata: serde_json::Value,

    /// Last error message (if any).
    pub last_error: Option<String>,

    /// Retry backoff gate: the item is not eligible before this instant.
    pub(crate) not_before: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub(crate) fn new(
        instruction: Instruction,
        options: EnqueueOptions,
        defaults: &QueueConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction,
            priority: options.priority,
            status: ItemStatus::Pending,
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(defaults.default_max_retries),
            retry_delay: options
                .retry_delay
                .unwrap_or_else(|| defaults.default_retry_delay()),
            dependencies: options.dependencies,
            tags: options.tags,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_duration: options.estimated_duration,
            metadata: options.metadata,
            last_error: None,
            not_before: None,
        }
    }

    /// Check if the item has retry attempts left.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Check if the item is pending and past its retry backoff gate.
    ///
    /// Dependency and concurrency checks are the queue's responsibility.
    pub fn is_ready(&self) -> bool {
        if self.status != ItemStatus::Pending {
            return false;
        }
        match self.not_before {
            Some(gate) => gate <= Utc::now(),
            None => true,
        }
    }
}
