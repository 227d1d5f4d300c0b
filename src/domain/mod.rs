//! Domain layer: pure domain model and shared types.
//!
//! Submodules:
//! - [`execution`]: Segments and node/edge/run status.
//! - [`model`]: Protocol-stable types (selectors, conditions).

pub mod execution;
pub mod model;

pub use execution::{EdgeState, ExecutionStatus, FileSegment, NodeStatus, Segment};
pub use model::{Case, ComparisonOperator, Condition, LogicalOperator, Selector, SYS_NODE_ID};
