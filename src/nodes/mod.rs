//! Node layer: the execution contract, the registry, and the engine-level
//! control nodes. Business nodes (LLM, tools, code) implement [`Node`] outside
//! the engine and are registered by type.

pub mod control_flow;
pub mod executor;
pub mod human_input;

pub use executor::{Node, NodeInputs, NodeOutcome, NodeRegistry, NodeRunResult, StreamChunk};
