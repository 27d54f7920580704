//! Execution capability and recovery seams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flowboard_queue::{EnqueueOptions, Instruction};

use crate::error::ExecutorResult;

/// Outcome reported by an execution capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the instruction succeeded.
    pub success: bool,

    /// Capability output (recorded into the item's metadata).
    pub output: Option<serde_json::Value>,

    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A successful outcome.
    pub fn ok(output: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Execution capability supplied by the caller.
///
/// The executor never interprets instruction payloads; it hands them to the
/// handler and feeds the outcome back into the queue. A handler may also
/// fail by returning `Err` or by panicking; both are normalized to a failed
/// attempt.
#[async_trait]
pub trait InstructionHandler: Send + Sync {
    /// Execute one instruction.
    async fn execute(&self, instruction: &Instruction) -> ExecutorResult<ExecutionResult>;
}

/// Source of previously pending work, replayed during startup.
///
/// Recovery across restarts belongs to an external persistence
/// collaborator; this seam lets it re-enqueue on `start()`.
#[async_trait]
pub trait RecoverySource: Send + Sync {
    /// Load instructions to re-enqueue, with their original options.
    async fn load_pending(&self) -> ExecutorResult<Vec<(Instruction, EnqueueOptions)>>;
}
