use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::runtime_context::ExecutionContext;
use crate::core::runtime_state::LoopCursor;
use crate::core::variable_pool::PoolView;
use crate::domain::model::Selector;
use crate::domain::Segment;
use crate::dsl::NodeType;
use crate::error::{ErrorCode, NodeError, NodeResult};

/// What a node receives for one invocation. The pool is a read-only
/// snapshot; a node publishes data only through its outputs.
#[derive(Debug, Clone)]
pub struct NodeInputs {
    pub node_id: String,
    pub node_type: NodeType,
    pub title: String,
    pub config: Value,
    pub pool: PoolView,
}

impl NodeInputs {
    pub fn variable(&self, selector: &Selector) -> Segment {
        self.pool.get(selector)
    }

    /// Deserialize `config[key]`, `None` when the key is absent.
    pub fn config_field<T: DeserializeOwned>(&self, key: &str) -> NodeResult<Option<T>> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| NodeError::ConfigError(format!("invalid '{}': {}", key, e))),
        }
    }
}

/// A piece of output a node publishes before it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub selector: Selector,
    pub chunk: Value,
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRunResult {
    pub outputs: HashMap<String, Value>,
    /// Output handle matched against `branch_identify` edges.
    pub edge_source_handle: Option<String>,
    pub loop_cursor: Option<LoopCursor>,
}

impl NodeRunResult {
    pub fn with_outputs(outputs: HashMap<String, Value>) -> Self {
        Self {
            outputs,
            ..Default::default()
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.edge_source_handle = Some(handle.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Succeeded(NodeRunResult),
    Failed { error_kind: ErrorCode, message: String },
    /// The node is waiting on something external; the run suspends here.
    Paused { resume_hint: Value },
}

impl NodeOutcome {
    pub fn failed(error: &NodeError) -> Self {
        NodeOutcome::Failed {
            error_kind: error.error_code(),
            message: error.to_string(),
        }
    }
}

impl From<NodeResult<NodeOutcome>> for NodeOutcome {
    fn from(result: NodeResult<NodeOutcome>) -> Self {
        result.unwrap_or_else(|e| NodeOutcome::failed(&e))
    }
}

/// Execution contract every node type implements.
///
/// Invoked on worker tasks; implementations must not keep references to
/// engine state beyond the call.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, inputs: NodeInputs, ctx: ExecutionContext) -> NodeResult<NodeOutcome>;
}

/// Registry of node implementations by node type
#[derive(Default, Clone)]
pub struct NodeRegistry {
    nodes: HashMap<NodeType, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the engine-level control nodes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NodeType::Start, Arc::new(super::control_flow::StartNode));
        registry.register(NodeType::End, Arc::new(super::control_flow::EndNode));
        registry.register(NodeType::Answer, Arc::new(super::control_flow::AnswerNode));
        registry.register(NodeType::IfElse, Arc::new(super::control_flow::IfElseNode));
        registry.register(NodeType::HumanInput, Arc::new(super::human_input::HumanInputNode));
        registry
    }

    pub fn register(&mut self, node_type: NodeType, node: Arc<dyn Node>) {
        self.nodes.insert(node_type, node);
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn Node>> {
        self.nodes.get(&node_type).cloned()
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.nodes.contains_key(&node_type)
    }
}
