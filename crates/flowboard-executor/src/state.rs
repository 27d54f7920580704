//! Executor lifecycle states.

use serde::{Deserialize, Serialize};

/// Executor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ExecutorState {
    /// Initial and terminal state.
    Stopped = 0,
    /// Warming up (recovery, loop spawn).
    Starting = 1,
    /// Polling the queue.
    Running = 2,
    /// Pause requested; waiting for any in-flight execution to finish.
    Pausing = 3,
    /// Poll ticks gated; queue contents and stats untouched.
    Paused = 4,
    /// Unrecoverable initialization failure.
    Error = 5,
}

impl From<u8> for ExecutorState {
    fn from(v: u8) -> Self {
        match v {
            0 => ExecutorState::Stopped,
            1 => ExecutorState::Starting,
            2 => ExecutorState::Running,
            3 => ExecutorState::Pausing,
            4 => ExecutorState::Paused,
            5 => ExecutorState::Error,
            _ => ExecutorState::Stopped,
        }
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorState::Stopped => write!(f, "stopped"),
            ExecutorState::Starting => write!(f, "starting"),
            ExecutorState::Running => write!(f, "running"),
            ExecutorState::Pausing => write!(f, "pausing"),
            ExecutorState::Paused => write!(f, "paused"),
            ExecutorState::Error => write!(f, "error"),
        }
    }
}
