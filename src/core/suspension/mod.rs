//! Durable suspension records and the repositories that hold them.
//!
//! A suspended run is reduced to plain data: the runtime overlay and the
//! variable pool, encoded as a versioned JSON blob. Nothing in a record refers
//! to in-process handles, so a run may resume in another process.

pub mod repository;
pub mod types;

pub use repository::{FileSuspensionRepository, MemorySuspensionRepository, SuspensionRepository};
pub use types::{SuspendedState, SuspensionError, WorkflowSuspension, STATE_VERSION};
