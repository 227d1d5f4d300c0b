//! Graph engine: the single decision loop.
//!
//! [`GraphEngine`] owns the [`RuntimeGraph`] and the [`VariablePool`] of a
//! run. It computes the ready set, consults decision hooks, hands nodes to the
//! [`WorkerPool`], and applies results as they come back. Nothing else writes
//! run state, and every event is emitted from here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::command::{Command, EngineHandle};
use crate::core::config::EngineConfig;
use crate::core::error_strategy::{ConfiguredErrorStrategy, ErrorStrategy, NodeFailure, Recovery};
use crate::core::event_bus::{EventEmitter, GraphEngineEvent, PauseReason};
use crate::core::hooks::{consult, Decision, DecisionHook, DecisionParams};
use crate::core::layer::{Layer, LayerStack};
use crate::core::runtime_context::RuntimeContext;
use crate::core::runtime_state::{LoopCursor, RuntimeGraph};
use crate::core::suspension::{SuspendedState, SuspensionError, SuspensionRepository, WorkflowSuspension};
use crate::core::variable_pool::{PoolView, VariablePool};
use crate::core::worker_pool::{WorkEvent, WorkItem, WorkResult, WorkerPool};
use crate::domain::model::Selector;
use crate::domain::{EdgeState, ExecutionStatus, NodeStatus, Segment};
use crate::dsl::ErrorStrategyType;
use crate::error::{ErrorCode, WorkflowError, WorkflowResult};
use crate::evaluator::{check_run_condition, EdgeContext};
use crate::graph::{Graph, GraphNode, FAIL_BRANCH_HANDLE, SUCCESS_BRANCH_HANDLE};
use crate::nodes::{NodeInputs, NodeOutcome, NodeRegistry, NodeRunResult, StreamChunk};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// What a finished `run`/`resume` call reports.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub outputs: HashMap<String, Value>,
    pub exceptions_count: u32,
    pub error: Option<String>,
    pub node_statuses: BTreeMap<String, NodeStatus>,
    pub loop_cursors: BTreeMap<String, LoopCursor>,
    pub variables: VariablePool,
    pub suspension: Option<WorkflowSuspension>,
    /// Most workers alive at once during this call.
    pub worker_high_water: usize,
}

/// Why the loop stopped dispatching.
#[derive(Debug, Clone)]
enum Halt {
    Suspend { node_id: String, reason: PauseReason },
    Stop { reason: String },
    Fail(String),
}

struct Run {
    execution_id: String,
    inputs: HashMap<String, Value>,
    state: RuntimeGraph,
    pool: Arc<VariablePool>,
    halt: Option<Halt>,
    bypass_hooks_for: Option<String>,
}

impl Run {
    /// The first halt wins, except that a failure overrides a suspend or stop.
    fn halt_with(&mut self, halt: Halt) {
        match (&self.halt, &halt) {
            (None, _) => self.halt = Some(halt),
            (Some(Halt::Fail(_)), _) => {}
            (Some(_), Halt::Fail(_)) => self.halt = Some(halt),
            _ => {}
        }
    }

    fn is_halted(&self) -> bool {
        self.halt.is_some()
    }
}

enum Wake {
    Event(Option<WorkEvent>),
    Command(Option<Command>),
    Deadline,
}

pub struct GraphEngine {
    graph: Arc<Graph>,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    hooks: Vec<Box<dyn DecisionHook>>,
    layers: LayerStack,
    strategy: Arc<dyn ErrorStrategy>,
    repository: Option<Arc<dyn SuspensionRepository>>,
    runtime: RuntimeContext,
    workflow_id: String,
    execution_id: Option<String>,
    emitter: Option<EventEmitter>,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
}

pub struct GraphEngineBuilder {
    graph: Arc<Graph>,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    hooks: Vec<Box<dyn DecisionHook>>,
    layers: Vec<Box<dyn Layer>>,
    strategy: Arc<dyn ErrorStrategy>,
    repository: Option<Arc<dyn SuspensionRepository>>,
    runtime: RuntimeContext,
    workflow_id: String,
    execution_id: Option<String>,
    emitter: Option<EventEmitter>,
}

impl GraphEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hook(mut self, hook: impl DecisionHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn error_strategy(mut self, strategy: Arc<dyn ErrorStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn SuspensionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn runtime_context(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }

    /// Fix the execution id instead of generating one.
    pub fn execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn event_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> GraphEngine {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        GraphEngine {
            graph: self.graph,
            registry: self.registry,
            config: self.config,
            hooks: self.hooks,
            layers: LayerStack::new(self.layers),
            strategy: self.strategy,
            repository: self.repository,
            runtime: self.runtime,
            workflow_id: self.workflow_id,
            execution_id: self.execution_id,
            emitter: self.emitter,
            command_tx,
            command_rx,
        }
    }
}

impl GraphEngine {
    pub fn builder(graph: Arc<Graph>, registry: Arc<NodeRegistry>) -> GraphEngineBuilder {
        GraphEngineBuilder {
            graph,
            registry,
            config: EngineConfig::default(),
            hooks: Vec::new(),
            layers: Vec::new(),
            strategy: Arc::new(ConfiguredErrorStrategy),
            repository: None,
            runtime: RuntimeContext::default(),
            workflow_id: "workflow".to_string(),
            execution_id: None,
            emitter: None,
        }
    }

    /// Handle for stopping the run or updating variables while it executes.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.command_tx.clone())
    }

    /// Run the graph from its root. `inputs` land in the `sys` scope.
    pub async fn run(mut self, inputs: HashMap<String, Value>) -> WorkflowResult<ExecutionResult> {
        self.preflight()?;
        let execution_id = self
            .execution_id
            .take()
            .unwrap_or_else(|| self.runtime.id_generator.next_id());
        let run = Run {
            execution_id,
            state: RuntimeGraph::new(&self.graph),
            pool: Arc::new(VariablePool::with_inputs(&inputs)),
            inputs,
            halt: None,
            bypass_hooks_for: None,
        };
        self.execute(run, false).await
    }

    /// Continue a suspended run. `resume_inputs` are written under the
    /// suspended node's id; hooks are not consulted again for that node.
    pub async fn resume(
        mut self,
        suspension: WorkflowSuspension,
        resume_inputs: HashMap<String, Value>,
    ) -> WorkflowResult<ExecutionResult> {
        let state = suspension.decode_state()?;
        self.preflight()?;

        let next = suspension.next_node_id.clone();
        if !self.graph.contains_node(&next) {
            return Err(WorkflowError::NodeNotFound(next));
        }
        if let Some(unknown) = state
            .runtime
            .node_statuses()
            .keys()
            .find(|id| !self.graph.contains_node(id))
        {
            return Err(SuspensionError::Serialization(format!(
                "suspended state references unknown node '{}'",
                unknown
            ))
            .into());
        }

        let mut pool = state.pool;
        for (key, value) in &resume_inputs {
            pool.set(&Selector::new(next.clone(), key.clone()), Segment::from_value(value));
        }
        self.workflow_id = suspension.workflow_id.clone();
        info!(
            execution_id = %suspension.execution_id,
            suspension_id = %suspension.id,
            next_node_id = %next,
            "resuming suspended run"
        );

        let run = Run {
            execution_id: suspension.execution_id.clone(),
            inputs: suspension.decode_inputs()?,
            state: state.runtime,
            pool: Arc::new(pool),
            halt: None,
            bypass_hooks_for: Some(next),
        };
        self.execute(run, true).await
    }

    fn preflight(&self) -> WorkflowResult<()> {
        self.config.validate()?;
        for node in self.graph.nodes() {
            if !self.registry.contains(node.node_type) {
                return Err(WorkflowError::ExecutorNotFound(node.node_type.to_string()));
            }
        }
        Ok(())
    }

    async fn execute(mut self, mut run: Run, resumed: bool) -> WorkflowResult<ExecutionResult> {
        let mut pool = WorkerPool::start(self.config.worker_pool.clone())?;
        info!(
            execution_id = %run.execution_id,
            workflow_id = %self.workflow_id,
            resumed,
            "graph run started"
        );

        if let Err((layer, message)) = self.layers.dispatch(|l| l.on_graph_start()) {
            run.halt_with(Halt::Fail(WorkflowError::LayerError { layer, message }.to_string()));
        }
        let started = GraphEngineEvent::GraphRunStarted {
            execution_id: run.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            resumed,
        };
        self.emit(&mut run, started).await;

        if !run.is_halted() {
            self.drive(&mut run, &mut pool).await;
        }
        self.settle(&mut run, &mut pool).await;

        let high_water = pool.high_water_mark();
        pool.shutdown().await;
        self.finish(run, high_water).await
    }

    async fn drive(&mut self, run: &mut Run, pool: &mut WorkerPool) {
        let limit = Duration::from_secs(self.config.max_execution_time_secs);
        // a limit past the clock's range means no deadline
        let deadline = tokio::time::Instant::now().checked_add(limit);

        loop {
            while let Ok(command) = self.command_rx.try_recv() {
                self.apply_command(run, command);
            }
            if run.is_halted() {
                break;
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                warn!(execution_id = %run.execution_id, "execution time limit reached");
                run.halt_with(Halt::Fail(
                    WorkflowError::ExecutionTimeout(self.config.max_execution_time_secs).to_string(),
                ));
                break;
            }

            self.dispatch_ready(run, pool).await;
            if run.is_halted() || !run.state.has_running() {
                break;
            }

            let wake = tokio::select! {
                e = pool.next_event() => Wake::Event(e),
                c = self.command_rx.recv() => Wake::Command(c),
                _ = until(deadline) => Wake::Deadline,
            };
            match wake {
                Wake::Event(Some(event)) => self.apply_event(run, pool, event).await,
                Wake::Event(None) => run.halt_with(Halt::Fail(
                    WorkflowError::InternalError("worker pool stopped unexpectedly".to_string())
                        .to_string(),
                )),
                Wake::Command(Some(command)) => self.apply_command(run, command),
                Wake::Command(None) | Wake::Deadline => {}
            }
            let arrived: Vec<WorkEvent> = pool.drain_events().collect();
            for event in arrived {
                self.apply_event(run, pool, event).await;
            }
        }
    }

    /// Stop accepting work, drop what no worker has started, and apply the
    /// results of nodes that were already running.
    async fn settle(&mut self, run: &mut Run, pool: &mut WorkerPool) {
        if !run.is_halted() {
            return;
        }
        pool.close();
        for item in pool.purge_pending() {
            debug!(node_id = %item.node_id, "queued node returned to not-started");
            self.revert_to_not_started(run, &item.node_id);
        }
        if run.state.has_running() {
            debug!(
                execution_id = %run.execution_id,
                running = ?run.state.running_nodes(),
                "waiting for in-flight nodes"
            );
        }
        while run.state.has_running() {
            match pool.next_event().await {
                Some(event) => self.apply_event(run, pool, event).await,
                None => break,
            }
        }
    }

    /// Also uncounts the attempt: it never reached a worker, or it paused and
    /// runs again on resume.
    fn revert_to_not_started(&self, run: &mut Run, node_id: &str) {
        self.release(run, node_id);
        run.state.revert_attempt(node_id);
    }

    /// Back to not-started, keeping the attempts already made.
    fn release(&self, run: &mut Run, node_id: &str) {
        run.state.set_status(node_id, NodeStatus::NotStarted);
        run.state.leave_parallel(node_id);
    }

    async fn dispatch_ready(&mut self, run: &mut Run, pool: &WorkerPool) {
        let graph = self.graph.clone();
        let mut ready = run.state.ready_nodes(&graph);
        if let Some(bypass) = &run.bypass_hooks_for {
            if let Some(pos) = ready.iter().position(|id| id == bypass) {
                let first = ready.remove(pos);
                ready.insert(0, first);
            }
        }

        for node_id in ready {
            if run.state.step_count() >= self.config.max_steps {
                run.halt_with(Halt::Fail(
                    WorkflowError::MaxStepsExceeded(self.config.max_steps).to_string(),
                ));
                return;
            }
            let node = match graph.node(&node_id) {
                Ok(node) => node,
                Err(e) => {
                    run.halt_with(Halt::Fail(e.to_string()));
                    return;
                }
            };

            let (decision, hook) = if run.bypass_hooks_for.as_deref() == Some(node_id.as_str()) {
                run.bypass_hooks_for = None;
                (Decision::Continue, None)
            } else {
                let params = DecisionParams {
                    next_node_instance: node,
                    execution_id: &run.execution_id,
                    step: run.state.step_count(),
                    pool: &run.pool,
                };
                consult(&self.hooks, &params)
            };

            match decision {
                Decision::Continue => self.dispatch(run, pool, node).await,
                Decision::Suspend => {
                    let hook = hook.unwrap_or_default();
                    info!(node_id = %node_id, hook = %hook, "suspending before node");
                    run.halt_with(Halt::Suspend {
                        node_id,
                        reason: PauseReason::Hook { hook },
                    });
                    return;
                }
                Decision::Stop => {
                    let hook = hook.unwrap_or_default();
                    info!(node_id = %node_id, hook = %hook, "stopping before node");
                    run.halt_with(Halt::Stop {
                        reason: format!("hook '{}' stopped the run before node '{}'", hook, node_id),
                    });
                    return;
                }
            }
            if run.is_halted() {
                return;
            }
        }
    }

    async fn dispatch(&mut self, run: &mut Run, pool: &WorkerPool, node: &GraphNode) {
        let attempt = run.state.next_attempt(&node.id);
        run.state.set_status(&node.id, NodeStatus::Running);
        let step = run.state.bump_step();
        let parallel_id = self.graph.parallel_of(&node.id).map(|g| g.id.clone());
        if let Some(pid) = &parallel_id {
            run.state.enter_parallel(pid, &node.id);
        }
        debug!(node_id = %node.id, node_type = %node.node_type, step, attempt, "dispatching node");

        self.emit(
            run,
            GraphEngineEvent::NodeRunStarted {
                node_id: node.id.clone(),
                node_type: node.node_type,
                node_title: node.title.clone(),
                attempt,
                parallel_id,
            },
        )
        .await;
        self.submit(run, pool, node, attempt, None);
    }

    fn submit(
        &self,
        run: &mut Run,
        pool: &WorkerPool,
        node: &GraphNode,
        attempt: u32,
        delay: Option<Duration>,
    ) {
        let Some(executor) = self.registry.get(node.node_type) else {
            run.halt_with(Halt::Fail(
                WorkflowError::ExecutorNotFound(node.node_type.to_string()).to_string(),
            ));
            return;
        };
        let item = WorkItem {
            node_id: node.id.clone(),
            attempt,
            node: executor,
            inputs: NodeInputs {
                node_id: node.id.clone(),
                node_type: node.node_type,
                title: node.title.clone(),
                config: node.config.clone(),
                pool: PoolView::new(run.pool.clone()),
            },
            ctx: self
                .runtime
                .execution_context(&run.execution_id, &self.workflow_id, &node.id, attempt),
            timeout: node
                .timeout_secs
                .or(self.config.default_node_timeout_secs)
                .map(Duration::from_secs),
            delay,
        };
        if let Err(e) = pool.submit(item) {
            warn!(node_id = %node.id, error = %e, "submission rejected");
            self.revert_to_not_started(run, &node.id);
            run.halt_with(Halt::Fail(WorkflowError::from(e).to_string()));
        }
    }

    fn apply_command(&mut self, run: &mut Run, command: Command) {
        match command {
            Command::Stop { reason } => {
                let reason = reason.unwrap_or_else(|| "stop requested".to_string());
                info!(execution_id = %run.execution_id, reason = %reason, "stop requested");
                run.halt_with(Halt::Stop { reason });
            }
            Command::UpdateVariables(variables) => {
                let pool = Arc::make_mut(&mut run.pool);
                for (selector, value) in variables {
                    pool.set(&selector, Segment::from_value(&value));
                }
            }
        }
    }

    async fn apply_event(&mut self, run: &mut Run, pool: &WorkerPool, event: WorkEvent) {
        match event {
            WorkEvent::Chunk {
                node_id,
                attempt,
                chunk,
            } => self.forward_chunk(run, node_id, attempt, chunk).await,
            WorkEvent::Done(result) => self.apply_result(run, pool, result).await,
        }
    }

    /// Chunks of the current attempt of a running node become events; any
    /// other chunk is stale.
    async fn forward_chunk(
        &mut self,
        run: &mut Run,
        node_id: String,
        attempt: u32,
        chunk: StreamChunk,
    ) {
        let current = run.state.status(&node_id) == NodeStatus::Running
            && run.state.attempt(&node_id) == attempt;
        if !current {
            debug!(node_id = %node_id, attempt, "dropping stale stream chunk");
            return;
        }
        let StreamChunk {
            selector,
            chunk,
            is_final,
        } = chunk;
        self.emit(
            run,
            GraphEngineEvent::NodeRunStreamChunk {
                node_id,
                selector,
                chunk,
                is_final,
            },
        )
        .await;
    }

    async fn apply_result(&mut self, run: &mut Run, pool: &WorkerPool, result: WorkResult) {
        let graph = self.graph.clone();
        let node = match graph.node(&result.node_id) {
            Ok(node) => node,
            Err(e) => {
                run.halt_with(Halt::Fail(e.to_string()));
                return;
            }
        };
        if run.state.status(&node.id) != NodeStatus::Running {
            warn!(node_id = %node.id, "ignoring result for a node that is not running");
            return;
        }
        let elapsed_ms = result.elapsed.as_millis() as u64;

        match result.outcome {
            NodeOutcome::Succeeded(output) => {
                self.on_succeeded(run, node, output, elapsed_ms).await;
            }
            NodeOutcome::Failed {
                error_kind,
                message,
            } => {
                self.on_failed(run, pool, node, error_kind, message, result.attempt, elapsed_ms)
                    .await;
            }
            NodeOutcome::Paused { resume_hint } => {
                info!(node_id = %node.id, "node paused");
                self.revert_to_not_started(run, &node.id);
                self.emit(
                    run,
                    GraphEngineEvent::NodeRunPaused {
                        node_id: node.id.clone(),
                        node_type: node.node_type,
                        resume_hint: resume_hint.clone(),
                    },
                )
                .await;
                run.halt_with(Halt::Suspend {
                    node_id: node.id.clone(),
                    reason: PauseReason::NodePaused { resume_hint },
                });
            }
        }
    }

    async fn on_succeeded(
        &mut self,
        run: &mut Run,
        node: &GraphNode,
        output: NodeRunResult,
        elapsed_ms: u64,
    ) {
        Arc::make_mut(&mut run.pool).set_node_outputs(&node.id, &output.outputs);
        if node.node_type.is_response() {
            run.state.merge_outputs(&output.outputs);
        }
        if let Some(cursor) = output.loop_cursor {
            run.state.set_loop_cursor(&node.id, cursor);
        }
        run.state.set_status(&node.id, NodeStatus::Succeeded);
        run.state.leave_parallel(&node.id);

        let handle = if node.strategy_type() == ErrorStrategyType::FailBranch {
            Some(SUCCESS_BRANCH_HANDLE.to_string())
        } else {
            output.edge_source_handle
        };
        self.emit(
            run,
            GraphEngineEvent::NodeRunSucceeded {
                node_id: node.id.clone(),
                node_type: node.node_type,
                outputs: output.outputs,
                edge_source_handle: handle.clone(),
                elapsed_ms,
            },
        )
        .await;
        self.resolve_edges(run, node, handle.as_deref());
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_failed(
        &mut self,
        run: &mut Run,
        pool: &WorkerPool,
        node: &GraphNode,
        error_kind: ErrorCode,
        message: String,
        attempt: u32,
        elapsed_ms: u64,
    ) {
        let recovery = self.strategy.on_failure(&NodeFailure {
            node,
            error_kind,
            message: &message,
            attempt,
        });
        debug!(node_id = %node.id, error_kind = %error_kind, ?recovery, "node failed");
        let abort = recovery == Recovery::AbortRun;

        match recovery {
            Recovery::Retry { delay } => {
                if pool.is_closed() {
                    // the retry runs after resume, or never
                    self.release(run, &node.id);
                    return;
                }
                let next = run.state.next_attempt(&node.id);
                info!(node_id = %node.id, attempt = next, delay_ms = delay.as_millis() as u64, "retrying node");
                self.emit(
                    run,
                    GraphEngineEvent::NodeRunRetried {
                        node_id: node.id.clone(),
                        node_type: node.node_type,
                        attempt: next,
                        error_kind,
                        message,
                        retry_delay_ms: delay.as_millis() as u64,
                    },
                )
                .await;
                self.submit(run, pool, node, next, Some(delay));
            }
            Recovery::FailBranch => {
                self.recover(run, node, error_kind, message, HashMap::new(), ErrorStrategyType::FailBranch)
                    .await;
                self.resolve_edges(run, node, Some(FAIL_BRANCH_HANDLE));
            }
            Recovery::DefaultValue(values) => {
                self.recover(run, node, error_kind, message, values, ErrorStrategyType::DefaultValue)
                    .await;
                self.resolve_edges(run, node, None);
            }
            Recovery::FailNode | Recovery::AbortRun => {
                warn!(node_id = %node.id, error_kind = %error_kind, "{}", message);
                run.state.record_exception(&node.id, &message);
                run.state.set_status(&node.id, NodeStatus::Failed);
                run.state.leave_parallel(&node.id);
                self.emit(
                    run,
                    GraphEngineEvent::NodeRunFailed {
                        node_id: node.id.clone(),
                        node_type: node.node_type,
                        error_kind,
                        message: message.clone(),
                        elapsed_ms,
                    },
                )
                .await;
                run.state.skip_outgoing(&self.graph, &node.id);
                if abort {
                    run.halt_with(Halt::Fail(
                        WorkflowError::NodeExecutionError {
                            node_id: node.id.clone(),
                            error: message,
                        }
                        .to_string(),
                    ));
                }
            }
        }
    }

    /// A failure absorbed by the node's strategy: the node counts as
    /// succeeded with `error_message`/`error_type` outputs.
    async fn recover(
        &mut self,
        run: &mut Run,
        node: &GraphNode,
        error_kind: ErrorCode,
        message: String,
        mut outputs: HashMap<String, Value>,
        strategy: ErrorStrategyType,
    ) {
        run.state.record_exception(&node.id, &message);
        outputs.insert("error_message".to_string(), Value::String(message.clone()));
        outputs.insert(
            "error_type".to_string(),
            Value::String(error_kind.as_str().to_string()),
        );
        Arc::make_mut(&mut run.pool).set_node_outputs(&node.id, &outputs);
        run.state.set_status(&node.id, NodeStatus::Succeeded);
        run.state.leave_parallel(&node.id);
        self.emit(
            run,
            GraphEngineEvent::NodeRunException {
                node_id: node.id.clone(),
                node_type: node.node_type,
                error_kind,
                message,
                strategy,
            },
        )
        .await;
    }

    /// Decide every outgoing edge of a resolved node, then propagate skips.
    /// A malformed condition aborts the run.
    fn resolve_edges(&self, run: &mut Run, node: &GraphNode, handle: Option<&str>) {
        let graph = &self.graph;
        for edge in graph.outgoing_edges(&node.id) {
            let ctx = EdgeContext {
                selected_handle: handle,
                pool: &run.pool,
            };
            let state = match check_run_condition(edge.run_condition.as_ref(), &ctx) {
                Ok(true) => EdgeState::Taken,
                Ok(false) => EdgeState::Skipped,
                Err(e) => {
                    error!(edge_id = %edge.id, error = %e, "condition evaluation failed");
                    run.halt_with(Halt::Fail(
                        WorkflowError::ConditionError {
                            edge_id: edge.id.clone(),
                            message: e.to_string(),
                        }
                        .to_string(),
                    ));
                    EdgeState::Skipped
                }
            };
            run.state.set_edge_state(&edge.id, state);
        }
        let skipped = run.state.propagate_skips(graph, &node.id);
        if !skipped.is_empty() {
            debug!(node_id = %node.id, ?skipped, "downstream nodes skipped");
        }
    }

    /// Layers first (fail-fast), then the event channel.
    async fn emit(&mut self, run: &mut Run, event: GraphEngineEvent) {
        if let Err((layer, message)) = self.layers.dispatch(|l| l.on_event(&event)) {
            error!(layer = %layer, error = %message, "layer failed");
            run.halt_with(Halt::Fail(WorkflowError::LayerError { layer, message }.to_string()));
        }
        if let Some(emitter) = &self.emitter {
            emitter.emit(event).await;
        }
    }

    async fn finish(mut self, mut run: Run, worker_high_water: usize) -> WorkflowResult<ExecutionResult> {
        let outputs = run.state.outputs();
        let exceptions_count = run.state.exceptions_count();
        let aggregate = if run.state.errors().is_empty() {
            None
        } else {
            Some(run.state.errors().join("; "))
        };

        let mut suspension = None;
        let (mut status, mut error, terminal) = match run.halt.take() {
            None => {
                let status = run.state.classify(&self.graph);
                let event = match status {
                    ExecutionStatus::Succeeded => GraphRunEventKind::Succeeded,
                    ExecutionStatus::PartialSucceeded => GraphRunEventKind::PartialSucceeded,
                    _ => GraphRunEventKind::Failed,
                };
                let error = match status {
                    ExecutionStatus::Succeeded => None,
                    _ => aggregate.clone(),
                };
                (status, error, event)
            }
            Some(Halt::Fail(message)) => (ExecutionStatus::Failed, Some(message), GraphRunEventKind::Failed),
            Some(Halt::Stop { reason }) => {
                (ExecutionStatus::Stopped, Some(reason), GraphRunEventKind::Stopped)
            }
            Some(Halt::Suspend { node_id, reason }) => {
                match self.suspend(&run, &node_id, reason.clone()).await {
                    Ok(record) => {
                        let event = GraphRunEventKind::Paused {
                            suspension_id: record.id.clone(),
                            next_node_id: node_id,
                            reason,
                        };
                        suspension = Some(record);
                        (ExecutionStatus::Suspended, None, event)
                    }
                    Err(e) => {
                        error!(execution_id = %run.execution_id, error = %e, "suspension failed");
                        let message = e.to_string();
                        if let Err((layer, failure)) =
                            self.layers.dispatch(|l| l.on_graph_end(Some(message.as_str())))
                        {
                            warn!(layer = %layer, error = %failure, "layer failed at graph end");
                        }
                        return Err(e.into());
                    }
                }
            }
        };

        let event = match terminal {
            GraphRunEventKind::Succeeded => GraphEngineEvent::GraphRunSucceeded {
                outputs: outputs.clone(),
            },
            GraphRunEventKind::PartialSucceeded => GraphEngineEvent::GraphRunPartialSucceeded {
                outputs: outputs.clone(),
                exceptions_count,
                error: error.clone(),
            },
            GraphRunEventKind::Failed => GraphEngineEvent::GraphRunFailed {
                error: error.clone().unwrap_or_default(),
                exceptions_count,
            },
            GraphRunEventKind::Stopped => GraphEngineEvent::GraphRunStopped {
                reason: error.clone().unwrap_or_default(),
            },
            GraphRunEventKind::Paused {
                suspension_id,
                next_node_id,
                reason,
            } => GraphEngineEvent::GraphRunPaused {
                suspension_id,
                next_node_id,
                reason,
            },
        };
        self.emit(&mut run, event).await;
        if let Err((layer, message)) = self.layers.dispatch(|l| l.on_graph_end(error.as_deref())) {
            run.halt_with(Halt::Fail(WorkflowError::LayerError { layer, message }.to_string()));
        }
        if let Some(Halt::Fail(message)) = run.halt.take() {
            status = ExecutionStatus::Failed;
            error = Some(message);
        }

        info!(
            execution_id = %run.execution_id,
            status = %status,
            exceptions_count,
            "graph run finished"
        );

        Ok(ExecutionResult {
            execution_id: run.execution_id,
            status,
            outputs,
            exceptions_count,
            error,
            node_statuses: run.state.node_statuses().clone(),
            loop_cursors: run.state.loop_cursors().clone(),
            variables: Arc::try_unwrap(run.pool).unwrap_or_else(|shared| (*shared).clone()),
            suspension,
            worker_high_water,
        })
    }

    async fn suspend(
        &mut self,
        run: &Run,
        node_id: &str,
        reason: PauseReason,
    ) -> Result<WorkflowSuspension, SuspensionError> {
        let state = SuspendedState {
            runtime: run.state.clone(),
            pool: (*run.pool).clone(),
            reason,
        };
        let record = WorkflowSuspension::new(
            self.runtime.id_generator.next_id(),
            run.execution_id.clone(),
            self.workflow_id.clone(),
            node_id,
            &state,
            &run.inputs,
        )?;
        if let Some(repository) = &self.repository {
            repository.save(&record).await?;
        }
        info!(
            execution_id = %run.execution_id,
            suspension_id = %record.id,
            next_node_id = %node_id,
            "run suspended"
        );
        Ok(record)
    }
}

async fn until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

enum GraphRunEventKind {
    Succeeded,
    PartialSucceeded,
    Failed,
    Stopped,
    Paused {
        suspension_id: String,
        next_node_id: String,
        reason: PauseReason,
    },
}
