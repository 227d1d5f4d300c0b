use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::core::runtime_context::ExecutionContext;
use crate::domain::model::{Case, Selector, SYS_NODE_ID};
use crate::error::{NodeError, NodeResult};
use crate::evaluator::evaluate_cases;
use crate::nodes::executor::{Node, NodeInputs, NodeOutcome, NodeRunResult};

#[derive(Debug, Clone, Deserialize)]
struct StartVariable {
    variable: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    default: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutputVariable {
    variable: String,
    #[serde(alias = "variable_selector")]
    value_selector: Selector,
}

// ================================
// Start Node
// ================================

/// Publishes the run inputs (the `sys` scope) as its own outputs.
pub struct StartNode;

#[async_trait]
impl Node for StartNode {
    async fn run(&self, inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        let mut outputs: HashMap<String, Value> = inputs
            .pool
            .node_variables(SYS_NODE_ID)
            .into_iter()
            .map(|(k, v)| (k, v.to_value()))
            .collect();

        let declared: Vec<StartVariable> = inputs.config_field("variables")?.unwrap_or_default();
        for var in declared {
            if outputs.get(&var.variable).map_or(true, Value::is_null) {
                match (var.default, var.required) {
                    (Some(default), _) => {
                        outputs.insert(var.variable, default);
                    }
                    (None, true) => {
                        return Err(NodeError::InputValidationError(format!(
                            "missing required input '{}'",
                            var.variable
                        )));
                    }
                    (None, false) => {}
                }
            }
        }

        Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)))
    }
}

// ================================
// End Node
// ================================

/// Collects declared output selectors; these become the run outputs.
pub struct EndNode;

#[async_trait]
impl Node for EndNode {
    async fn run(&self, inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        let declared: Vec<OutputVariable> = inputs.config_field("outputs")?.unwrap_or_default();
        let outputs = declared
            .into_iter()
            .map(|ov| {
                let value = inputs.variable(&ov.value_selector).to_value();
                (ov.variable, value)
            })
            .collect();
        Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)))
    }
}

// ================================
// Answer Node
// ================================

/// Renders `{{#node.var#}}` references in its `answer` text and streams the
/// result as one final chunk.
pub struct AnswerNode;

#[async_trait]
impl Node for AnswerNode {
    async fn run(&self, inputs: NodeInputs, ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        let template: String = inputs.config_field("answer")?.unwrap_or_default();
        let rendered = render_references(&template, |sel| inputs.variable(sel).to_display_string());
        ctx.stream_chunk(
            Selector::new(inputs.node_id.clone(), "answer"),
            Value::String(rendered.clone()),
            true,
        );

        let mut outputs = HashMap::new();
        outputs.insert("answer".to_string(), Value::String(rendered));
        Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)))
    }
}

/// Replace every `{{#a.b#}}` with the resolved selector. Text that does not
/// parse as a selector is kept verbatim.
fn render_references<F>(template: &str, resolve: F) -> String
where
    F: Fn(&Selector) -> String,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{#") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        match after.find("#}}") {
            Some(end) => {
                let inner = after[..end].trim();
                match Selector::parse_str(inner) {
                    Some(sel) => out.push_str(&resolve(&sel)),
                    None => out.push_str(&rest[start..start + 3 + end + 3]),
                }
                rest = &after[end + 3..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// ================================
// IfElse Node (multi-case)
// ================================

/// Selects the first matching case, or the `false` handle.
pub struct IfElseNode;

#[async_trait]
impl Node for IfElseNode {
    async fn run(&self, inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        let cases: Vec<Case> = inputs
            .config_field("cases")?
            .ok_or_else(|| NodeError::ConfigError("if-else node has no cases".to_string()))?;

        let selected = evaluate_cases(&cases, &inputs.pool)?;

        let mut outputs = HashMap::new();
        outputs.insert("selected_case".to_string(), Value::String(selected.clone()));
        Ok(NodeOutcome::Succeeded(
            NodeRunResult::with_outputs(outputs).with_handle(selected),
        ))
    }
}
