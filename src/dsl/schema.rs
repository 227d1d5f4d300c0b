use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::model::{Condition, LogicalOperator};

// ================================
// Workflow DSL Schema
// ================================

/// Current supported DSL version
pub const CURRENT_DSL_VERSION: &str = "0.1.0";

/// All supported DSL versions
pub const SUPPORTED_DSL_VERSIONS: &[&str] = &["0.1.0"];

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WorkflowSchema {
    /// DSL version string, e.g. "0.1.0"
    pub version: String,
    /// Explicit entry node; defaults to the node without incoming edges.
    #[serde(default)]
    pub root_node_id: Option<String>,
    pub nodes: Vec<NodeSchema>,
    #[serde(default)]
    pub edges: Vec<EdgeSchema>,
}

/// Node definition in the DSL.
/// The `data` object embeds the type tag and all node-specific config.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NodeSchema {
    pub id: String,
    pub data: NodeData,
}

/// Common node data.  The `type` field determines the concrete node.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct NodeData {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub error_strategy: Option<ErrorStrategyConfig>,
    #[serde(default)]
    pub retry_config: Option<RetryConfig>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// All remaining fields are captured here as a JSON map.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EdgeSchema {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, alias = "sourceHandle")]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub condition: Option<EdgeConditionSchema>,
}

/// Boolean expression attached to an edge.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EdgeConditionSchema {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

// ================================
// Error Strategy
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ErrorStrategyConfig {
    #[serde(rename = "type")]
    pub strategy_type: ErrorStrategyType,
    #[serde(default)]
    pub default_value: Option<HashMap<String, Value>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategyType {
    /// Fail the node; downstream-only nodes are skipped, siblings continue.
    None,
    FailBranch,
    DefaultValue,
    /// Fail the whole run.
    Abort,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    /// Milliseconds between attempts (base for backoff).
    #[serde(default)]
    pub retry_interval: u64,
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval: u64,
    #[serde(default)]
    pub retry_on_retryable_only: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_interval: 0,
            backoff_strategy: BackoffStrategy::Fixed,
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_interval: default_max_retry_interval(),
            retry_on_retryable_only: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
    ExponentialWithJitter,
}

fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_max_retry_interval() -> u64 { 60000 }

// ================================
// Node Type Enum
// ================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    End,
    Answer,
    IfElse,
    Code,
    Llm,
    Tool,
    HttpRequest,
    TemplateTransform,
    VariableAssigner,
    Iteration,
    HumanInput,
    KnowledgeRetrieval,
    QuestionClassifier,
    ParameterExtractor,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Answer => "answer",
            NodeType::IfElse => "if-else",
            NodeType::Code => "code",
            NodeType::Llm => "llm",
            NodeType::Tool => "tool",
            NodeType::HttpRequest => "http-request",
            NodeType::TemplateTransform => "template-transform",
            NodeType::VariableAssigner => "variable-assigner",
            NodeType::Iteration => "iteration",
            NodeType::HumanInput => "human-input",
            NodeType::KnowledgeRetrieval => "knowledge-retrieval",
            NodeType::QuestionClassifier => "question-classifier",
            NodeType::ParameterExtractor => "parameter-extractor",
        }
    }

    /// Nodes whose outputs become the run's outputs.
    pub fn is_response(&self) -> bool {
        matches!(self, NodeType::End | NodeType::Answer)
    }

    /// Nodes that pick one outgoing handle.
    pub fn is_branch(&self) -> bool {
        matches!(self, NodeType::IfElse | NodeType::QuestionClassifier)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_serde_matches_display() {
        let t: NodeType = serde_json::from_value(serde_json::json!("if-else")).unwrap();
        assert_eq!(t, NodeType::IfElse);
        assert_eq!(t.to_string(), "if-else");
        assert!(t.is_branch());
        assert!(NodeType::End.is_response());
    }

    #[test]
    fn test_node_data_captures_extra_fields() {
        let data: NodeData = serde_json::from_value(serde_json::json!({
            "type": "code",
            "title": "Double",
            "timeout_secs": 3,
            "error_strategy": {"type": "default-value", "default_value": {"x": 0}},
            "script": "double"
        }))
        .unwrap();
        assert_eq!(data.node_type, NodeType::Code);
        assert_eq!(data.timeout_secs, Some(3));
        assert_eq!(
            data.error_strategy.unwrap().strategy_type,
            ErrorStrategyType::DefaultValue
        );
        assert_eq!(data.extra.get("script"), Some(&serde_json::json!("double")));
    }

    #[test]
    fn test_retry_config_defaults() {
        let cfg: RetryConfig = serde_json::from_value(serde_json::json!({"max_retries": 2})).unwrap();
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.backoff_strategy, BackoffStrategy::Fixed);
        assert_eq!(cfg.max_retry_interval, 60000);
        assert!(!cfg.retry_on_retryable_only);
    }
}
