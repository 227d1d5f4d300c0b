//! Workflow-level error types.

use super::NodeError;
use crate::core::suspension::SuspensionError;
use crate::core::worker_pool::SchedulerError;
use thiserror::Error;

/// Workflow-level errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("DSL parse error: {0}")]
    DslParseError(String),
    #[error("Unsupported DSL version: {found}, supported versions: {supported}")]
    UnsupportedVersion { found: String, supported: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Graph build error: {0}")]
    GraphBuildError(String),
    #[error("Graph validation error: {0}")]
    GraphValidationError(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Node executor not found for type: {0}")]
    ExecutorNotFound(String),
    #[error("No root node found")]
    NoRootNode,
    #[error("Multiple root nodes found: {0}")]
    MultipleRootNodes(String),
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Execution exceeded maximum time of {0} seconds")]
    ExecutionTimeout(u64),
    #[error("Max steps exceeded: {0}")]
    MaxStepsExceeded(u32),
    #[error("Condition error on edge {edge_id}: {message}")]
    ConditionError { edge_id: String, message: String },
    #[error("Layer '{layer}' failed: {message}")]
    LayerError { layer: String, message: String },
    #[error("Node execution error: node={node_id}, error={error}")]
    NodeExecutionError { node_id: String, error: String },
    #[error("Suspension error: {0}")]
    Suspension(#[from] SuspensionError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Node error: {0}")]
    NodeError(Box<NodeError>),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<NodeError> for WorkflowError {
    fn from(value: NodeError) -> Self {
        WorkflowError::NodeError(Box::new(value))
    }
}
