use thiserror::Error;

use super::ErrorCode;

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Input validation error: {0}")]
    InputValidationError(String),
    #[error("Timeout: node execution exceeded time limit")]
    Timeout,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl NodeError {
    /// The failure kind reported in `NodeRunFailed` events.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            NodeError::ConfigError(_) => ErrorCode::ConfigError,
            NodeError::VariableNotFound(_) => ErrorCode::VariableNotFound,
            NodeError::ExecutionError(_) => ErrorCode::ExecutionError,
            NodeError::TypeError(_) => ErrorCode::TypeError,
            NodeError::InputValidationError(_) => ErrorCode::InputValidationError,
            NodeError::Timeout => ErrorCode::Timeout,
            NodeError::SerializationError(_) => ErrorCode::SerializationError,
        }
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
