use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::error::WorkflowError;

/// 以节点 ID 为权重的 petgraph 有向图及索引映射
pub(crate) struct IndexedDag {
    pub graph: DiGraph<String, ()>,
    pub index: HashMap<String, NodeIndex>,
}

impl IndexedDag {
    pub fn new<'a>(
        node_ids: impl IntoIterator<Item = &'a String>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for id in node_ids {
            let idx = graph.add_node(id.clone());
            index.insert(id.clone(), idx);
        }
        for (source, target) in edges {
            if let (Some(s), Some(t)) = (index.get(source), index.get(target)) {
                graph.add_edge(*s, *t, ());
            }
        }
        Self { graph, index }
    }

    /// 拓扑排序；存在环时返回 CycleDetected
    pub fn topological_sort(&self) -> Result<Vec<String>, WorkflowError> {
        let sorted =
            petgraph::algo::toposort(&self.graph, None).map_err(|_| WorkflowError::CycleDetected)?;
        Ok(sorted
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// 从某节点出发可达的全部节点（包含自身）
    pub fn reachable_from(&self, node_id: &str) -> HashSet<String> {
        let mut reached = HashSet::new();
        let Some(start) = self.index.get(node_id) else {
            return reached;
        };
        let mut dfs = Dfs::new(&self.graph, *start);
        while let Some(idx) = dfs.next(&self.graph) {
            reached.insert(self.graph[idx].clone());
        }
        reached
    }
}
