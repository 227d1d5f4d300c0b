use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::dsl::{parse_dsl, DslFormat, ErrorStrategyType, NodeType, WorkflowSchema};
use crate::error::WorkflowError;

use super::traversal::IndexedDag;
use super::types::*;

/// 从 DSL 文本直接构建图
pub fn build_graph_from_dsl(content: &str, format: DslFormat) -> Result<Graph, WorkflowError> {
    let schema = parse_dsl(content, format)?;
    build_graph(&schema)
}

/// 从 DSL schema 构建不可变图
///
/// 校验：节点 ID 唯一、边引用的节点存在、无环、唯一根节点、所有节点从根可达。
pub fn build_graph(schema: &WorkflowSchema) -> Result<Graph, WorkflowError> {
    if schema.nodes.is_empty() {
        return Err(WorkflowError::GraphBuildError(
            "Graph must have at least one node".to_string(),
        ));
    }

    // 1. 节点
    let mut nodes: HashMap<String, GraphNode> = HashMap::with_capacity(schema.nodes.len());
    let mut declared_order: Vec<String> = Vec::with_capacity(schema.nodes.len());
    for node_schema in &schema.nodes {
        if node_schema.id.is_empty() {
            return Err(WorkflowError::GraphValidationError(
                "node id must not be empty".to_string(),
            ));
        }
        if nodes.contains_key(&node_schema.id) {
            return Err(WorkflowError::GraphValidationError(format!(
                "duplicate node id: {}",
                node_schema.id
            )));
        }
        let data = &node_schema.data;
        let config = Value::Object(
            data.extra
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        nodes.insert(
            node_schema.id.clone(),
            GraphNode {
                id: node_schema.id.clone(),
                node_type: data.node_type,
                title: if data.title.is_empty() {
                    node_schema.id.clone()
                } else {
                    data.title.clone()
                },
                config,
                error_strategy: data.error_strategy.clone(),
                retry_config: data.retry_config.clone(),
                timeout_secs: data.timeout_secs,
            },
        );
        declared_order.push(node_schema.id.clone());
    }

    // 2. 边与运行条件
    let mut edges: HashMap<String, GraphEdge> = HashMap::with_capacity(schema.edges.len());
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    for edge_schema in &schema.edges {
        let source = nodes.get(&edge_schema.source).ok_or_else(|| {
            WorkflowError::GraphBuildError(format!(
                "Source node not found: {}",
                edge_schema.source
            ))
        })?;
        if !nodes.contains_key(&edge_schema.target) {
            return Err(WorkflowError::GraphBuildError(format!(
                "Target node not found: {}",
                edge_schema.target
            )));
        }

        let handle = edge_schema.source_handle.as_deref();
        let id = if edge_schema.id.is_empty() {
            format!(
                "{}-{}-{}",
                edge_schema.source,
                handle.unwrap_or(DEFAULT_SOURCE_HANDLE),
                edge_schema.target
            )
        } else {
            edge_schema.id.clone()
        };
        if edges.contains_key(&id) {
            return Err(WorkflowError::GraphValidationError(format!(
                "duplicate edge id: {}",
                id
            )));
        }

        let run_condition = if let Some(cond) = &edge_schema.condition {
            Some(RunCondition::Condition {
                logical_operator: cond.logical_operator,
                conditions: cond.conditions.clone(),
            })
        } else if source.strategy_type() == ErrorStrategyType::FailBranch
            && handle != Some(FAIL_BRANCH_HANDLE)
        {
            Some(RunCondition::branch(SUCCESS_BRANCH_HANDLE))
        } else {
            match handle {
                Some(h) if h != DEFAULT_SOURCE_HANDLE => Some(RunCondition::branch(h)),
                _ => None,
            }
        };

        outgoing
            .entry(edge_schema.source.clone())
            .or_default()
            .push(id.clone());
        incoming
            .entry(edge_schema.target.clone())
            .or_default()
            .push(id.clone());
        edges.insert(
            id.clone(),
            GraphEdge {
                id,
                source: edge_schema.source.clone(),
                target: edge_schema.target.clone(),
                run_condition,
            },
        );
    }

    // 3. 环检测与拓扑序
    let dag = IndexedDag::new(
        &declared_order,
        schema
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str())),
    );
    let node_order = dag.topological_sort()?;

    // 4. 根节点
    let root_node_id = select_root(schema, &nodes, &declared_order, &incoming)?;

    // 5. 可达性
    let reachable = dag.reachable_from(&root_node_id);
    if let Some(orphan) = declared_order.iter().find(|id| !reachable.contains(*id)) {
        return Err(WorkflowError::GraphValidationError(format!(
            "node '{}' is not reachable from root '{}'",
            orphan, root_node_id
        )));
    }

    let mut graph = Graph {
        root_node_id,
        nodes,
        node_order,
        edges,
        outgoing,
        incoming,
        parallels: HashMap::new(),
        node_parallel: HashMap::new(),
        joins: HashMap::new(),
    };

    // 6. 并行组
    detect_parallels(&mut graph, &dag);

    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        parallels = graph.parallels.len(),
        root = %graph.root_node_id,
        "graph built"
    );
    Ok(graph)
}

fn select_root(
    schema: &WorkflowSchema,
    nodes: &HashMap<String, GraphNode>,
    declared_order: &[String],
    incoming: &HashMap<String, Vec<String>>,
) -> Result<String, WorkflowError> {
    if let Some(root) = &schema.root_node_id {
        if !nodes.contains_key(root) {
            return Err(WorkflowError::NodeNotFound(root.clone()));
        }
        return Ok(root.clone());
    }

    let candidates: Vec<&String> = declared_order
        .iter()
        .filter(|id| incoming.get(*id).map_or(true, |e| e.is_empty()))
        .collect();
    match candidates.as_slice() {
        [] => Err(WorkflowError::NoRootNode),
        [only] => Ok((*only).clone()),
        many => {
            let starts: Vec<&&String> = many
                .iter()
                .filter(|id| {
                    nodes
                        .get(id.as_str())
                        .map_or(false, |n| n.node_type == NodeType::Start)
                })
                .collect();
            match starts.as_slice() {
                [only] => Ok((**only).clone()),
                _ => Err(WorkflowError::MultipleRootNodes(
                    many.iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                )),
            }
        }
    }
}

/// 识别并行组
///
/// 按拓扑序处理扇出节点，使外层组先于内层组生成；成员的最内层组随之覆盖。
/// 组 ID 由起点与序号确定，跨进程重建时保持一致。
fn detect_parallels(graph: &mut Graph, dag: &IndexedDag) {
    let reach: HashMap<String, HashSet<String>> = graph
        .node_order
        .iter()
        .map(|id| (id.clone(), dag.reachable_from(id)))
        .collect();

    let order = graph.node_order.clone();
    for node_id in &order {
        let out = graph.outgoing_edges(node_id);
        if out.len() < 2 {
            continue;
        }

        // 同一条件哈希下的目标构成一组
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for edge in out {
            let key = edge
                .run_condition
                .as_ref()
                .map(|c| c.hash())
                .unwrap_or_default();
            let targets = groups.entry(key).or_default();
            if !targets.contains(&edge.target) {
                targets.push(edge.target.clone());
            }
        }

        let mut seq = 0;
        for branches in groups.into_values() {
            if branches.len() < 2 {
                continue;
            }
            seq += 1;
            let id = format!("{}-parallel-{}", node_id, seq);

            let mut common: Option<HashSet<String>> = None;
            let mut union: HashSet<String> = HashSet::new();
            for b in &branches {
                let r = &reach[b];
                union.extend(r.iter().cloned());
                common = Some(match common {
                    None => r.clone(),
                    Some(c) => c.intersection(r).cloned().collect(),
                });
            }
            let common = common.unwrap_or_default();
            let end_to_node_id = order.iter().find(|n| common.contains(*n)).cloned();
            let member_node_ids: Vec<String> = order
                .iter()
                .filter(|n| union.contains(*n) && !common.contains(*n))
                .cloned()
                .collect();

            let group = ParallelGroup {
                id: id.clone(),
                start_from_node_id: node_id.clone(),
                parent_parallel_id: graph.node_parallel.get(node_id).cloned(),
                branch_start_node_ids: branches,
                member_node_ids,
                end_to_node_id,
            };
            for member in &group.member_node_ids {
                graph.node_parallel.insert(member.clone(), id.clone());
            }
            if let Some(join) = &group.end_to_node_id {
                graph.joins.entry(join.clone()).or_default().push(id.clone());
            }
            graph.parallels.insert(id, group);
        }
    }
}

impl Graph {
    pub fn build(schema: &WorkflowSchema) -> Result<Self, WorkflowError> {
        build_graph(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> Result<Graph, WorkflowError> {
        build_graph_from_dsl(yaml, DslFormat::Yaml)
    }

    const DIAMOND: &str = r#"
version: "0.1.0"
nodes:
  - { id: start, data: { type: start } }
  - { id: a, data: { type: code } }
  - { id: b, data: { type: code } }
  - { id: b2, data: { type: code } }
  - { id: join, data: { type: end } }
edges:
  - { source: start, target: a }
  - { source: start, target: b }
  - { source: b, target: b2 }
  - { source: a, target: join }
  - { source: b2, target: join }
"#;

    #[test]
    fn test_build_diamond_parallel_group() {
        let graph = build(DIAMOND).unwrap();
        assert_eq!(graph.root_node_id(), "start");
        assert_eq!(graph.parallels().count(), 1);
        let group = graph.parallel("start-parallel-1").unwrap();
        assert_eq!(group.branch_start_node_ids, vec!["a", "b"]);
        assert_eq!(group.end_to_node_id.as_deref(), Some("join"));
        let mut members = group.member_node_ids.clone();
        members.sort();
        assert_eq!(members, vec!["a", "b", "b2"]);
        assert_eq!(graph.parallel_of("b2").unwrap().id, group.id);
        assert_eq!(graph.groups_joining_at("join").len(), 1);
        assert_eq!(graph.sink_nodes(), vec!["join"]);
    }

    #[test]
    fn test_branch_handles_do_not_form_parallel() {
        let graph = build(
            r#"
version: "0.1.0"
nodes:
  - { id: start, data: { type: start } }
  - { id: gate, data: { type: if-else, cases: [] } }
  - { id: yes, data: { type: end } }
  - { id: no, data: { type: end } }
edges:
  - { source: start, target: gate }
  - { source: gate, target: yes, sourceHandle: "true" }
  - { source: gate, target: no, sourceHandle: "false" }
"#,
        )
        .unwrap();
        assert_eq!(graph.parallels().count(), 0);
        let out = graph.outgoing_edges("gate");
        assert_eq!(out[0].run_condition, Some(RunCondition::branch("true")));
    }

    #[test]
    fn test_fail_branch_source_gets_success_handle() {
        let graph = build(
            r#"
version: "0.1.0"
nodes:
  - { id: start, data: { type: start } }
  - { id: risky, data: { type: code, error_strategy: { type: fail-branch } } }
  - { id: ok, data: { type: end } }
  - { id: recover, data: { type: end } }
edges:
  - { source: start, target: risky }
  - { source: risky, target: ok, sourceHandle: source }
  - { source: risky, target: recover, sourceHandle: fail-branch }
"#,
        )
        .unwrap();
        let conds: Vec<_> = graph
            .outgoing_edges("risky")
            .into_iter()
            .map(|e| e.run_condition.clone())
            .collect();
        assert_eq!(
            conds,
            vec![
                Some(RunCondition::branch(SUCCESS_BRANCH_HANDLE)),
                Some(RunCondition::branch(FAIL_BRANCH_HANDLE)),
            ]
        );
    }

    #[test]
    fn test_missing_target_rejected() {
        let err = build(
            r#"
version: "0.1.0"
nodes:
  - { id: start, data: { type: start } }
edges:
  - { source: start, target: ghost }
"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Graph build error: Target node not found: ghost");
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = build(
            r#"
version: "0.1.0"
nodes:
  - { id: a, data: { type: start } }
  - { id: a, data: { type: end } }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::GraphValidationError(_)));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = build(
            r#"
version: "0.1.0"
root_node_id: a
nodes:
  - { id: a, data: { type: start } }
  - { id: b, data: { type: code } }
  - { id: c, data: { type: code } }
edges:
  - { source: a, target: b }
  - { source: b, target: c }
  - { source: c, target: b }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let err = build(
            r#"
version: "0.1.0"
nodes:
  - { id: a, data: { type: code } }
  - { id: b, data: { type: code } }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::MultipleRootNodes(_)));
    }

    #[test]
    fn test_start_node_preferred_as_root_then_orphan_rejected() {
        let err = build(
            r#"
version: "0.1.0"
nodes:
  - { id: s, data: { type: start } }
  - { id: stray, data: { type: code } }
"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Graph validation error: node 'stray' is not reachable from root 's'"
        );
    }
}
