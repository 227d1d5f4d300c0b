//! Protocol-stable model types shared across layers.

mod condition;
mod selector;

pub use condition::{Case, ComparisonOperator, Condition, LogicalOperator};
pub use selector::{Selector, SYS_NODE_ID};
