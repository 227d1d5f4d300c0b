use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::core::runtime_context::ExecutionContext;
use crate::domain::model::Selector;
use crate::error::NodeResult;
use crate::nodes::executor::{Node, NodeInputs, NodeOutcome, NodeRunResult};

/// Variable under the node's own id that carries the human's answer.
pub const HUMAN_INPUT_KEY: &str = "input";

/// Pauses the run until an answer exists at `(node_id, "input")`.
///
/// Resuming a suspension writes the resume inputs under the paused node's
/// id, so the second invocation finds the answer and succeeds with it.
pub struct HumanInputNode;

#[async_trait]
impl Node for HumanInputNode {
    async fn run(&self, inputs: NodeInputs, ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        let answer = inputs.variable(&Selector::new(inputs.node_id.clone(), HUMAN_INPUT_KEY));
        if !answer.is_none() {
            let mut outputs = HashMap::new();
            outputs.insert(HUMAN_INPUT_KEY.to_string(), answer.to_value());
            return Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)));
        }

        let prompt: Option<String> = inputs.config_field("prompt")?;
        let timeout_secs: Option<u64> = inputs.config_field("timeout_secs")?;
        let requested_at = ctx.time_provider.now_timestamp();
        Ok(NodeOutcome::Paused {
            resume_hint: json!({
                "node_id": inputs.node_id,
                "node_title": inputs.title,
                "prompt": prompt,
                "resume_token": ctx.id_generator.next_id(),
                "requested_at": requested_at,
                "timeout_at": timeout_secs.map(|s| requested_at.saturating_add(s as i64)),
                "expects": HUMAN_INPUT_KEY,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime_context::{FakeIdGenerator, FakeTimeProvider, RuntimeContext};
    use crate::core::variable_pool::{PoolView, VariablePool};
    use crate::domain::Segment;
    use crate::dsl::NodeType;
    use std::sync::Arc;

    fn inputs(pool: VariablePool) -> NodeInputs {
        NodeInputs {
            node_id: "approval".into(),
            node_type: NodeType::HumanInput,
            title: "Approval".into(),
            config: json!({"prompt": "Approve?", "timeout_secs": 10}),
            pool: PoolView::from(pool),
        }
    }

    fn ctx() -> ExecutionContext {
        RuntimeContext::default()
            .with_time_provider(Arc::new(FakeTimeProvider::new(1000)))
            .with_id_generator(Arc::new(FakeIdGenerator::new("tok")))
            .execution_context("e1", "wf", "approval", 1)
    }

    #[tokio::test]
    async fn test_pauses_without_answer() {
        let outcome = HumanInputNode
            .run(inputs(VariablePool::new()), ctx())
            .await
            .unwrap();
        match outcome {
            NodeOutcome::Paused { resume_hint } => {
                assert_eq!(resume_hint["prompt"], "Approve?");
                assert_eq!(resume_hint["node_title"], "Approval");
                assert_eq!(resume_hint["resume_token"], "tok-0");
                assert_eq!(resume_hint["requested_at"], 1000);
                assert_eq!(resume_hint["timeout_at"], 1010);
            }
            other => panic!("expected pause, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_succeeds_with_answer() {
        let mut pool = VariablePool::new();
        pool.set(
            &Selector::new("approval", HUMAN_INPUT_KEY),
            Segment::String("yes".into()),
        );
        let outcome = HumanInputNode.run(inputs(pool), ctx()).await.unwrap();
        match outcome {
            NodeOutcome::Succeeded(result) => assert_eq!(result.outputs["input"], json!("yes")),
            other => panic!("expected success, got {:?}", other),
        }
    }
}
