//! Queue errors.

use thiserror::Error;
use uuid::Uuid;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue is at its configured capacity.
    #[error("Queue is full")]
    QueueFull,

    /// Item not found.
    #[error("Item not found: {0}")]
    ItemNotFound(Uuid),

    /// A declared dependency does not exist in the queue.
    #[error("Dependency not found: {0}")]
    DependencyNotFound(Uuid),

    /// Attaching the declared dependencies would create a cycle.
    #[error("Dependency cycle detected: {0:?}")]
    DependencyCycle(Vec<Uuid>),
}
