//! Execution decision hooks, consulted before each ready node is dispatched.

use std::collections::HashSet;

use crate::core::variable_pool::VariablePool;
use crate::graph::GraphNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Suspend,
    Stop,
}

/// What a hook sees. Everything is borrowed read-only.
pub struct DecisionParams<'a> {
    pub next_node_instance: &'a GraphNode,
    pub execution_id: &'a str,
    pub step: u32,
    pub pool: &'a VariablePool,
}

pub trait DecisionHook: Send + Sync {
    fn name(&self) -> &str {
        "decision_hook"
    }

    fn decide(&self, params: &DecisionParams<'_>) -> Decision;
}

impl<F> DecisionHook for F
where
    F: Fn(&DecisionParams<'_>) -> Decision + Send + Sync,
{
    fn decide(&self, params: &DecisionParams<'_>) -> Decision {
        self(params)
    }
}

/// Pin a closure's signature so it can be boxed as a [`DecisionHook`].
pub fn hook_fn<F>(f: F) -> F
where
    F: Fn(&DecisionParams<'_>) -> Decision + Send + Sync,
{
    f
}

/// Suspends the run right before any of the listed nodes would start.
#[derive(Debug, Clone, Default)]
pub struct SuspendBeforeNodes {
    node_ids: HashSet<String>,
}

impl SuspendBeforeNodes {
    pub fn new<I, S>(node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_ids: node_ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl DecisionHook for SuspendBeforeNodes {
    fn name(&self) -> &str {
        "suspend_before_nodes"
    }

    fn decide(&self, params: &DecisionParams<'_>) -> Decision {
        if self.node_ids.contains(&params.next_node_instance.id) {
            Decision::Suspend
        } else {
            Decision::Continue
        }
    }
}

/// First non-`Continue` answer wins, in registration order.
pub(crate) fn consult(
    hooks: &[Box<dyn DecisionHook>],
    params: &DecisionParams<'_>,
) -> (Decision, Option<String>) {
    for hook in hooks {
        match hook.decide(params) {
            Decision::Continue => continue,
            other => return (other, Some(hook.name().to_string())),
        }
    }
    (Decision::Continue, None)
}
