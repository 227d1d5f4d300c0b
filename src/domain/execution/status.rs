//! Execution status types: per-node, per-edge, and per-run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a single node within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Traversal state of an edge. `Unknown` until its source node resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    #[default]
    Unknown,
    Taken,
    Skipped,
}

/// Engine-level run state.
///
/// `Idle → Running → {Succeeded, Failed, PartialSucceeded, Stopped, Suspended}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    PartialSucceeded,
    Stopped,
    Suspended,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Idle | ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::PartialSucceeded => "partial-succeeded",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}
