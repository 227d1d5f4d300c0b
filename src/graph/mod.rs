//! Graph construction and representation.
//!
//! The immutable [`Graph`] is built from a [`WorkflowSchema`](crate::dsl::WorkflowSchema)
//! by [`build_graph`]. It carries nodes, edges with their [`RunCondition`]s, adjacency
//! lists, and the parallel-branch groups the decision loop uses for join barriers.

pub mod builder;
pub(crate) mod traversal;
pub mod types;

pub use builder::{build_graph, build_graph_from_dsl};
pub use types::*;
