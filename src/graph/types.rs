use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::model::{Condition, LogicalOperator};
use crate::dsl::{ErrorStrategyConfig, ErrorStrategyType, NodeType, RetryConfig};
use crate::error::WorkflowError;

/// 成功分支句柄（配置了 fail-branch 的节点正常完成时选择）
pub const SUCCESS_BRANCH_HANDLE: &str = "success-branch";
/// 失败分支句柄
pub const FAIL_BRANCH_HANDLE: &str = "fail-branch";
/// 默认输出句柄
pub const DEFAULT_SOURCE_HANDLE: &str = "source";

/// 图节点
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// 节点 ID（对应 DSL 中的 id）
    pub id: String,

    /// 节点类型
    pub node_type: NodeType,

    /// 节点标题
    pub title: String,

    /// 节点声明的配置（DSL data 中除公共字段外的部分）
    pub config: Value,

    pub error_strategy: Option<ErrorStrategyConfig>,
    pub retry_config: Option<RetryConfig>,
    pub timeout_secs: Option<u64>,
}

impl GraphNode {
    pub fn strategy_type(&self) -> ErrorStrategyType {
        self.error_strategy
            .as_ref()
            .map(|s| s.strategy_type)
            .unwrap_or(ErrorStrategyType::None)
    }
}

/// 边的运行条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunCondition {
    /// 与源节点选择的输出句柄精确匹配
    BranchIdentify { branch_identify: String },
    /// 对变量池求值的布尔表达式
    Condition {
        #[serde(default)]
        logical_operator: LogicalOperator,
        conditions: Vec<Condition>,
    },
}

impl RunCondition {
    pub fn branch(handle: impl Into<String>) -> Self {
        RunCondition::BranchIdentify {
            branch_identify: handle.into(),
        }
    }

    /// 条件内容哈希（sha256 十六进制），用于识别相同条件
    pub fn hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        format!("{:x}", digest)
    }
}

/// 图边
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// 边 ID
    pub id: String,

    /// 源节点 ID
    pub source: String,

    /// 目标节点 ID
    pub target: String,

    /// 运行条件；None 表示源节点成功即通过
    pub run_condition: Option<RunCondition>,
}

/// 并行分支组
///
/// 由同一节点按相同条件扇出的多条边构成。成员全部到达终态之前，
/// 汇合节点（`end_to_node_id`）不会就绪。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub id: String,
    pub start_from_node_id: String,
    pub parent_parallel_id: Option<String>,
    pub branch_start_node_ids: Vec<String>,
    pub member_node_ids: Vec<String>,
    pub end_to_node_id: Option<String>,
}

/// 不可变的图结构，构建后通过 `Arc<Graph>` 在工作线程间只读共享
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) root_node_id: String,
    pub(crate) nodes: HashMap<String, GraphNode>,
    /// 拓扑序
    pub(crate) node_order: Vec<String>,
    pub(crate) edges: HashMap<String, GraphEdge>,
    pub(crate) outgoing: HashMap<String, Vec<String>>,
    pub(crate) incoming: HashMap<String, Vec<String>>,
    pub(crate) parallels: HashMap<String, ParallelGroup>,
    pub(crate) node_parallel: HashMap<String, String>,
    /// 汇合节点 → 以它为汇合点的并行组
    pub(crate) joins: HashMap<String, Vec<String>>,
}

impl Graph {
    pub fn root_node_id(&self) -> &str {
        &self.root_node_id
    }

    /// 根据节点 ID 获取图节点
    pub fn node(&self, node_id: &str) -> Result<&GraphNode, WorkflowError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 按拓扑序遍历节点
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn topological_order(&self) -> &[String] {
        &self.node_order
    }

    pub fn edge(&self, edge_id: &str) -> Option<&GraphEdge> {
        self.edges.get(edge_id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    /// 节点的出边（保持 DSL 中的顺序）
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&GraphEdge> {
        self.edge_list(self.outgoing.get(node_id))
    }

    /// 节点的入边
    pub fn incoming_edges(&self, node_id: &str) -> Vec<&GraphEdge> {
        self.edge_list(self.incoming.get(node_id))
    }

    fn edge_list(&self, ids: Option<&Vec<String>>) -> Vec<&GraphEdge> {
        ids.map(|ids| ids.iter().filter_map(|id| self.edges.get(id)).collect())
            .unwrap_or_default()
    }

    /// 没有出边的节点
    pub fn sink_nodes(&self) -> Vec<&str> {
        self.node_order
            .iter()
            .filter(|id| self.outgoing.get(*id).map_or(true, |e| e.is_empty()))
            .map(|id| id.as_str())
            .collect()
    }

    pub fn parallel(&self, parallel_id: &str) -> Option<&ParallelGroup> {
        self.parallels.get(parallel_id)
    }

    pub fn parallels(&self) -> impl Iterator<Item = &ParallelGroup> {
        self.parallels.values()
    }

    /// 节点所属的最内层并行组
    pub fn parallel_of(&self, node_id: &str) -> Option<&ParallelGroup> {
        self.node_parallel
            .get(node_id)
            .and_then(|pid| self.parallels.get(pid))
    }

    /// 以该节点为汇合点的并行组
    pub fn groups_joining_at(&self, node_id: &str) -> Vec<&ParallelGroup> {
        self.joins
            .get(node_id)
            .map(|ids| ids.iter().filter_map(|id| self.parallels.get(id)).collect())
            .unwrap_or_default()
    }
}
