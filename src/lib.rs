//! # graphflow: a graph workflow execution engine
//!
//! `graphflow` runs workflows described as directed acyclic graphs of typed
//! nodes. A single decision loop owns all run state; node bodies execute on a
//! bounded, autoscaling worker pool and report back through a result queue.
//!
//! - **Conditional edges**: branch handles and boolean condition trees decide
//!   which edges are taken; unreachable nodes are skipped transitively.
//! - **Error strategies**: retry with backoff, fail-branch, default values,
//!   fail-node or abort-run, per node.
//! - **Lifecycle events**: ordered run and node events delivered to layers
//!   and an optional channel.
//! - **Suspend/resume**: decision hooks or pausing nodes (human input) stop
//!   the run at a node boundary; the serialized state resumes later, in the
//!   same process or another one.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use graphflow::{build_graph_from_dsl, DslFormat, GraphEngine, NodeRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), graphflow::WorkflowError> {
//!     let yaml = std::fs::read_to_string("workflow.yaml").unwrap();
//!     let graph = build_graph_from_dsl(&yaml, DslFormat::Yaml)?;
//!     let engine = GraphEngine::builder(Arc::new(graph), Arc::new(NodeRegistry::with_builtins()))
//!         .build();
//!     let result = engine.run(HashMap::new()).await?;
//!     println!("{:?}", result.status);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domain;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod nodes;

pub use crate::core::{
    EngineConfig, EngineHandle, EventEmitter, ExecutionResult, GraphEngine, GraphEngineBuilder,
    GraphEngineEvent, Layer, MemorySuspensionRepository, FileSuspensionRepository, RuntimeContext,
    SuspendBeforeNodes, SuspensionRepository, VariablePool, WorkerPoolConfig, WorkflowSuspension,
};
pub use crate::domain::{ExecutionStatus, NodeStatus, Segment, Selector};
pub use crate::dsl::{parse_dsl, DslFormat, NodeType, WorkflowSchema};
pub use crate::error::{NodeError, WorkflowError};
pub use crate::graph::{build_graph, build_graph_from_dsl, Graph};
pub use crate::nodes::{Node, NodeInputs, NodeOutcome, NodeRegistry, NodeRunResult, StreamChunk};
