use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::event_bus::PauseReason;
use crate::core::runtime_state::RuntimeGraph;
use crate::core::variable_pool::VariablePool;

/// Current encoding of [`SuspendedState`].
pub const STATE_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum SuspensionError {
    #[error("state version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("suspension not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for SuspensionError {
    fn from(e: serde_json::Error) -> Self {
        SuspensionError::Serialization(e.to_string())
    }
}

/// Persisted suspension record. `state` and `inputs` are opaque JSON blobs;
/// only `state_version` is inspected before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSuspension {
    pub id: String,
    pub execution_id: String,
    pub workflow_id: String,
    pub next_node_id: String,
    pub state: String,
    pub state_version: String,
    pub inputs: String,
}

impl WorkflowSuspension {
    pub fn new(
        id: impl Into<String>,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        next_node_id: impl Into<String>,
        state: &SuspendedState,
        inputs: &HashMap<String, Value>,
    ) -> Result<Self, SuspensionError> {
        Ok(Self {
            id: id.into(),
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            next_node_id: next_node_id.into(),
            state: state.encode()?,
            state_version: STATE_VERSION.to_string(),
            inputs: serde_json::to_string(inputs)?,
        })
    }

    /// Decode the state blob. Any version other than [`STATE_VERSION`] is
    /// rejected; there is no downgrade path.
    pub fn decode_state(&self) -> Result<SuspendedState, SuspensionError> {
        if self.state_version != STATE_VERSION {
            return Err(SuspensionError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: self.state_version.clone(),
            });
        }
        Ok(serde_json::from_str(&self.state)?)
    }

    pub fn decode_inputs(&self) -> Result<HashMap<String, Value>, SuspensionError> {
        if self.inputs.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&self.inputs)?)
    }
}

/// Everything needed to rebuild a run at its pause point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedState {
    pub runtime: RuntimeGraph,
    pub pool: VariablePool,
    pub reason: PauseReason,
}

impl SuspendedState {
    pub fn encode(&self) -> Result<String, SuspensionError> {
        Ok(serde_json::to_string(self)?)
    }
}
