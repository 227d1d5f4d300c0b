//! Mutable per-run overlay on top of the immutable [`Graph`].
//!
//! Only the decision loop owns a [`RuntimeGraph`]; workers never see it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{EdgeState, ExecutionStatus, NodeStatus};
use crate::graph::Graph;

/// Position of an iteration/loop node inside its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCursor {
    pub index: usize,
    pub length: usize,
}

impl LoopCursor {
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.length
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeGraph {
    node_status: BTreeMap<String, NodeStatus>,
    edge_states: BTreeMap<String, EdgeState>,
    /// parallel id -> in-flight member nodes
    active_parallels: BTreeMap<String, BTreeSet<String>>,
    loop_cursors: BTreeMap<String, LoopCursor>,
    attempts: BTreeMap<String, u32>,
    /// Outputs collected from response nodes (end/answer).
    outputs: BTreeMap<String, Value>,
    errors: Vec<String>,
    exceptions_count: u32,
    step_count: u32,
}

impl RuntimeGraph {
    pub fn new(graph: &Graph) -> Self {
        Self {
            node_status: graph
                .nodes()
                .map(|n| (n.id.clone(), NodeStatus::NotStarted))
                .collect(),
            edge_states: graph
                .edges()
                .map(|e| (e.id.clone(), EdgeState::Unknown))
                .collect(),
            ..Self::default()
        }
    }

    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.node_status.get(node_id).copied().unwrap_or_default()
    }

    pub fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        self.node_status.insert(node_id.to_string(), status);
    }

    pub fn node_statuses(&self) -> &BTreeMap<String, NodeStatus> {
        &self.node_status
    }

    pub fn edge_state(&self, edge_id: &str) -> EdgeState {
        self.edge_states.get(edge_id).copied().unwrap_or_default()
    }

    pub fn set_edge_state(&mut self, edge_id: &str, state: EdgeState) {
        self.edge_states.insert(edge_id.to_string(), state);
    }

    pub fn running_nodes(&self) -> Vec<&str> {
        self.nodes_with(NodeStatus::Running)
    }

    pub fn has_running(&self) -> bool {
        self.node_status.values().any(|s| *s == NodeStatus::Running)
    }

    fn nodes_with(&self, status: NodeStatus) -> Vec<&str> {
        self.node_status
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// A node is ready when it has not started, none of its incoming edges is
    /// still undecided, at least one was taken, and every parallel group
    /// joining at it has all members in a terminal state. The root is the
    /// only node ready without incoming edges.
    pub fn is_ready(&self, graph: &Graph, node_id: &str) -> bool {
        if self.status(node_id) != NodeStatus::NotStarted {
            return false;
        }
        let incoming = graph.incoming_edges(node_id);
        if incoming.is_empty() {
            return node_id == graph.root_node_id();
        }
        let mut any_taken = false;
        for edge in incoming {
            match self.edge_state(&edge.id) {
                EdgeState::Unknown => return false,
                EdgeState::Taken => any_taken = true,
                EdgeState::Skipped => {}
            }
        }
        any_taken && self.joins_complete(graph, node_id)
    }

    fn joins_complete(&self, graph: &Graph, node_id: &str) -> bool {
        graph.groups_joining_at(node_id).iter().all(|group| {
            group
                .member_node_ids
                .iter()
                .all(|m| self.status(m).is_terminal())
        })
    }

    /// Ready nodes in topological order.
    pub fn ready_nodes(&self, graph: &Graph) -> Vec<String> {
        graph
            .topological_order()
            .iter()
            .filter(|id| self.is_ready(graph, id))
            .cloned()
            .collect()
    }

    /// Mark every outgoing edge of `node_id` skipped and propagate.
    pub fn skip_outgoing(&mut self, graph: &Graph, node_id: &str) {
        for edge in graph.outgoing_edges(node_id) {
            self.set_edge_state(&edge.id, EdgeState::Skipped);
        }
        self.propagate_skips(graph, node_id);
    }

    /// Starting from the targets of `from`'s outgoing edges, any not-started
    /// node whose incoming edges are all skipped becomes skipped, and so do
    /// its own outgoing edges. Returns the newly skipped nodes.
    pub fn propagate_skips(&mut self, graph: &Graph, from: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        let mut stack: Vec<String> = graph
            .outgoing_edges(from)
            .iter()
            .map(|e| e.target.clone())
            .collect();
        while let Some(node_id) = stack.pop() {
            if self.status(&node_id) != NodeStatus::NotStarted {
                continue;
            }
            let incoming = graph.incoming_edges(&node_id);
            let all_skipped = !incoming.is_empty()
                && incoming
                    .iter()
                    .all(|e| self.edge_state(&e.id) == EdgeState::Skipped);
            if !all_skipped {
                continue;
            }
            self.set_status(&node_id, NodeStatus::Skipped);
            for edge in graph.outgoing_edges(&node_id) {
                self.set_edge_state(&edge.id, EdgeState::Skipped);
                stack.push(edge.target.clone());
            }
            skipped.push(node_id);
        }
        skipped
    }

    pub fn enter_parallel(&mut self, parallel_id: &str, node_id: &str) {
        self.active_parallels
            .entry(parallel_id.to_string())
            .or_default()
            .insert(node_id.to_string());
    }

    /// Remove the node from whichever parallel it was registered in; a group
    /// with no in-flight members is dropped from the registry.
    pub fn leave_parallel(&mut self, node_id: &str) {
        self.active_parallels.retain(|_, members| {
            members.remove(node_id);
            !members.is_empty()
        });
    }

    pub fn active_parallels(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.active_parallels
    }

    pub fn set_loop_cursor(&mut self, node_id: &str, cursor: LoopCursor) {
        self.loop_cursors.insert(node_id.to_string(), cursor);
    }

    pub fn loop_cursor(&self, node_id: &str) -> Option<LoopCursor> {
        self.loop_cursors.get(node_id).copied()
    }

    pub fn loop_cursors(&self) -> &BTreeMap<String, LoopCursor> {
        &self.loop_cursors
    }

    pub fn attempt(&self, node_id: &str) -> u32 {
        self.attempts.get(node_id).copied().unwrap_or(0)
    }

    /// Count one more attempt and return it (1-based).
    pub fn next_attempt(&mut self, node_id: &str) -> u32 {
        let slot = self.attempts.entry(node_id.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }

    /// Uncount the latest attempt.
    pub fn revert_attempt(&mut self, node_id: &str) {
        if let Some(slot) = self.attempts.get_mut(node_id) {
            *slot = slot.saturating_sub(1);
        }
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn bump_step(&mut self) -> u32 {
        self.step_count += 1;
        self.step_count
    }

    pub fn exceptions_count(&self) -> u32 {
        self.exceptions_count
    }

    pub fn record_exception(&mut self, node_id: &str, message: &str) {
        self.exceptions_count += 1;
        self.errors.push(format!("{}: {}", node_id, message));
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn merge_outputs(&mut self, outputs: &HashMap<String, Value>) {
        for (k, v) in outputs {
            self.outputs.insert(k.clone(), v.clone());
        }
    }

    pub fn outputs(&self) -> HashMap<String, Value> {
        self.outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Terminal status of a run that drained without being halted.
    ///
    /// No failed nodes: succeeded, or partially succeeded when some failure was
    /// recovered by a strategy. With failed nodes: partially succeeded if some
    /// sink still succeeded, failed otherwise.
    pub fn classify(&self, graph: &Graph) -> ExecutionStatus {
        let any_failed = self
            .node_status
            .values()
            .any(|s| *s == NodeStatus::Failed);
        if !any_failed {
            return if self.exceptions_count == 0 {
                ExecutionStatus::Succeeded
            } else {
                ExecutionStatus::PartialSucceeded
            };
        }
        let sink_succeeded = graph
            .sink_nodes()
            .iter()
            .any(|id| self.status(id) == NodeStatus::Succeeded);
        if sink_succeeded {
            ExecutionStatus::PartialSucceeded
        } else {
            ExecutionStatus::Failed
        }
    }
}
