//! Edge condition handlers.
//!
//! Each [`RunCondition`] variant has a handler that decides whether an edge is
//! taken once its source node has resolved.

use crate::core::variable_pool::VariablePool;
use crate::graph::RunCondition;
use crate::error::NodeError;

use super::condition::evaluate_conditions;

/// What a handler may look at when deciding an edge.
pub struct EdgeContext<'a> {
    /// Output handle chosen by the source node, if any.
    pub selected_handle: Option<&'a str>,
    pub pool: &'a VariablePool,
}

pub trait ConditionHandler: Send + Sync {
    fn check(&self, condition: &RunCondition, ctx: &EdgeContext<'_>) -> Result<bool, NodeError>;
}

/// Matches `branch_identify` against the source node's selected handle.
pub struct BranchIdentifyHandler;

impl ConditionHandler for BranchIdentifyHandler {
    fn check(&self, condition: &RunCondition, ctx: &EdgeContext<'_>) -> Result<bool, NodeError> {
        match condition {
            RunCondition::BranchIdentify { branch_identify } => {
                Ok(ctx.selected_handle == Some(branch_identify.as_str()))
            }
            _ => Err(NodeError::ConfigError(
                "branch handler given a non-branch condition".to_string(),
            )),
        }
    }
}

/// Evaluates a condition tree against the variable pool.
pub struct ConditionTreeHandler;

impl ConditionHandler for ConditionTreeHandler {
    fn check(&self, condition: &RunCondition, ctx: &EdgeContext<'_>) -> Result<bool, NodeError> {
        match condition {
            RunCondition::Condition {
                logical_operator,
                conditions,
            } => evaluate_conditions(*logical_operator, conditions, ctx.pool),
            _ => Err(NodeError::ConfigError(
                "condition handler given a branch condition".to_string(),
            )),
        }
    }
}

pub fn handler_for(condition: &RunCondition) -> &'static dyn ConditionHandler {
    match condition {
        RunCondition::BranchIdentify { .. } => &BranchIdentifyHandler,
        RunCondition::Condition { .. } => &ConditionTreeHandler,
    }
}

/// Decide one edge. An edge without a run condition is always taken.
pub fn check_run_condition(
    condition: Option<&RunCondition>,
    ctx: &EdgeContext<'_>,
) -> Result<bool, NodeError> {
    match condition {
        None => Ok(true),
        Some(cond) => handler_for(cond).check(cond, ctx),
    }
}
