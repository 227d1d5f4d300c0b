//! Execution-time value and status types.

mod segment;
mod status;

pub use segment::{FileSegment, Segment};
pub use status::{EdgeState, ExecutionStatus, NodeStatus};
