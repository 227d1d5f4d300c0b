pub mod cache;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error_strategy;
pub mod event_bus;
pub mod hooks;
pub mod layer;
pub mod runtime_context;
pub mod runtime_state;
pub mod suspension;
pub mod variable_pool;
pub mod worker_pool;

pub use cache::ResourceCache;
pub use command::{Command, EngineHandle};
pub use config::EngineConfig;
pub use dispatcher::{ExecutionResult, GraphEngine, GraphEngineBuilder};
pub use error_strategy::{
	calculate_retry_interval,
	ConfiguredErrorStrategy,
	ErrorStrategy,
	NodeFailure,
	Recovery,
};
pub use event_bus::{EventEmitter, GraphEngineEvent, PauseReason};
pub use hooks::{hook_fn, Decision, DecisionHook, DecisionParams, SuspendBeforeNodes};
pub use layer::{Layer, LayerResult, TracingLayer};
pub use runtime_context::{
	ChunkSink,
	ExecutionContext,
	FakeIdGenerator,
	FakeTimeProvider,
	IdGenerator,
	RealIdGenerator,
	RealTimeProvider,
	RuntimeContext,
	TimeProvider,
};
pub use runtime_state::{LoopCursor, RuntimeGraph};
pub use suspension::{
	FileSuspensionRepository,
	MemorySuspensionRepository,
	SuspendedState,
	SuspensionError,
	SuspensionRepository,
	WorkflowSuspension,
	STATE_VERSION,
};
pub use variable_pool::{PoolView, VariablePool};
pub use worker_pool::{SchedulerError, WorkEvent, WorkItem, WorkResult, WorkerPool, WorkerPoolConfig};
