//! Bounded, dynamically scaled pool of node workers.
//!
//! The decision loop submits [`WorkItem`]s and drains [`WorkEvent`]s; workers
//! never touch runtime state. Stream chunks a node reports while running and
//! its final [`WorkResult`] share one channel, so they arrive in send order. A monitor task samples queue depth and worker
//! idleness every `scale_check_interval_ms` and adds or retires workers
//! between `min_workers` and `max_workers`. Workers above the minimum are only
//! spawned on demand.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::runtime_context::{ChunkSink, ExecutionContext};
use crate::error::ErrorCode;
use crate::nodes::{Node, NodeInputs, NodeOutcome, StreamChunk};

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("work queue is closed")]
    QueueClosed,
    #[error("invalid worker pool config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Queue depth at which one more worker is added.
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: usize,
    /// Seconds an idle worker above `min_workers` may live.
    #[serde(default = "default_scale_down_idle_time")]
    pub scale_down_idle_time_secs: f64,
    #[serde(default = "default_scale_check_interval_ms")]
    pub scale_check_interval_ms: u64,
}

fn default_min_workers() -> usize {
    1
}

fn default_max_workers() -> usize {
    4
}

fn default_scale_up_threshold() -> usize {
    3
}

fn default_scale_down_idle_time() -> f64 {
    5.0
}

fn default_scale_check_interval_ms() -> u64 {
    100
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_idle_time_secs: default_scale_down_idle_time(),
            scale_check_interval_ms: default_scale_check_interval_ms(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.min_workers < 1 {
            return Err(SchedulerError::InvalidConfig(
                "min_workers must be at least 1".to_string(),
            ));
        }
        if self.max_workers < self.min_workers {
            return Err(SchedulerError::InvalidConfig(format!(
                "max_workers ({}) must be >= min_workers ({})",
                self.max_workers, self.min_workers
            )));
        }
        if self.scale_up_threshold == 0 {
            return Err(SchedulerError::InvalidConfig(
                "scale_up_threshold must be at least 1".to_string(),
            ));
        }
        if Duration::try_from_secs_f64(self.scale_down_idle_time_secs).is_err() {
            return Err(SchedulerError::InvalidConfig(format!(
                "scale_down_idle_time_secs must be a non-negative duration, got {}",
                self.scale_down_idle_time_secs
            )));
        }
        if self.scale_check_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "scale_check_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn idle_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.scale_down_idle_time_secs).unwrap_or(Duration::MAX)
    }
}

/// One node invocation handed to a worker.
pub struct WorkItem {
    pub node_id: String,
    pub attempt: u32,
    pub node: Arc<dyn Node>,
    pub inputs: NodeInputs,
    pub ctx: ExecutionContext,
    pub timeout: Option<Duration>,
    /// Wait before running (retry backoff).
    pub delay: Option<Duration>,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("node_id", &self.node_id)
            .field("attempt", &self.attempt)
            .field("timeout", &self.timeout)
            .field("delay", &self.delay)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WorkResult {
    pub node_id: String,
    pub attempt: u32,
    pub outcome: NodeOutcome,
    pub elapsed: Duration,
}

/// What workers report back, in the order they sent it.
#[derive(Debug, Clone)]
pub enum WorkEvent {
    /// Partial output of a node that is still running.
    Chunk {
        node_id: String,
        attempt: u32,
        chunk: StreamChunk,
    },
    Done(WorkResult),
}

struct WorkerSlot {
    cancel: CancellationToken,
    busy: bool,
    idle_since: Instant,
}

struct PoolShared {
    config: WorkerPoolConfig,
    queue: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
    closed: AtomicBool,
    results_tx: mpsc::UnboundedSender<WorkEvent>,
    workers: Mutex<HashMap<usize, WorkerSlot>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker_id: AtomicUsize,
    high_water: AtomicUsize,
}

impl PoolShared {
    fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    fn pop(&self) -> Option<WorkItem> {
        self.queue.lock().pop_front()
    }

    fn set_busy(&self, worker_id: usize, busy: bool) {
        if let Some(slot) = self.workers.lock().get_mut(&worker_id) {
            slot.busy = busy;
            if !busy {
                slot.idle_since = Instant::now();
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> usize {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let count = {
            let mut workers = self.workers.lock();
            workers.insert(
                id,
                WorkerSlot {
                    cancel: cancel.clone(),
                    busy: false,
                    idle_since: Instant::now(),
                },
            );
            workers.len()
        };
        self.high_water.fetch_max(count, Ordering::Relaxed);
        let handle = tokio::spawn(worker_loop(self.clone(), id, cancel));
        self.handles.lock().push(handle);
        debug!(worker_id = id, workers = count, "worker spawned");
        count
    }

    /// One scaling decision: add a worker when the queue is deep, otherwise
    /// retire the longest-idle worker above the minimum.
    fn rebalance(self: &Arc<Self>) {
        let depth = self.queue_depth();
        let count = self.workers.lock().len();
        if depth >= self.config.scale_up_threshold && count < self.config.max_workers {
            let now = self.spawn_worker();
            info!(queue_depth = depth, workers = now, "scaled up");
            return;
        }
        if count <= self.config.min_workers {
            return;
        }
        let limit = self.config.idle_limit();
        let mut workers = self.workers.lock();
        let victim = workers
            .iter()
            .filter(|(_, s)| !s.busy && s.idle_since.elapsed() >= limit)
            .min_by_key(|(_, s)| s.idle_since)
            .map(|(id, _)| *id);
        if let Some(id) = victim {
            if let Some(slot) = workers.remove(&id) {
                slot.cancel.cancel();
                info!(worker_id = id, workers = workers.len(), "scaled down");
            }
        }
    }
}

async fn worker_loop(shared: Arc<PoolShared>, worker_id: usize, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let notified = shared.notify.notified();
        if let Some(item) = shared.pop() {
            shared.set_busy(worker_id, true);
            let result = execute_item(item, &shared.results_tx).await;
            shared.set_busy(worker_id, false);
            if shared.results_tx.send(WorkEvent::Done(result)).is_err() {
                break;
            }
            continue;
        }
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        tokio::select! {
            _ = notified => {}
            _ = cancel.cancelled() => break,
        }
    }
    shared.workers.lock().remove(&worker_id);
    debug!(worker_id, "worker exited");
}

async fn execute_item(item: WorkItem, events: &mpsc::UnboundedSender<WorkEvent>) -> WorkResult {
    let WorkItem {
        node_id,
        attempt,
        node,
        inputs,
        mut ctx,
        timeout,
        delay,
    } = item;
    ctx.stream = ChunkSink::new(events.clone(), node_id.clone(), attempt);
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let started = Instant::now();
    let run = AssertUnwindSafe(node.run(inputs, ctx)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(r) => r,
            Err(_) => {
                return WorkResult {
                    node_id,
                    attempt,
                    outcome: NodeOutcome::Failed {
                        error_kind: ErrorCode::Timeout,
                        message: format!("node execution exceeded {:?}", limit),
                    },
                    elapsed: started.elapsed(),
                };
            }
        },
        None => run.await,
    };

    let outcome = match outcome {
        Ok(result) => NodeOutcome::from(result),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "node panicked".to_string());
            warn!(node_id = %node_id, "node panicked: {}", message);
            NodeOutcome::Failed {
                error_kind: ErrorCode::InternalError,
                message: format!("node panicked: {}", message),
            }
        }
    };

    WorkResult {
        node_id,
        attempt,
        outcome,
        elapsed: started.elapsed(),
    }
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    results_rx: mpsc::UnboundedReceiver<WorkEvent>,
    monitor_cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Validate the config, spawn `min_workers` workers and the scaling
    /// monitor. Must be called inside a tokio runtime.
    pub fn start(config: WorkerPoolConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let interval = Duration::from_millis(config.scale_check_interval_ms);
        let min_workers = config.min_workers;
        let shared = Arc::new(PoolShared {
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            results_tx,
            workers: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        });
        for _ in 0..min_workers {
            shared.spawn_worker();
        }

        let monitor_cancel = CancellationToken::new();
        let monitor = {
            let shared = shared.clone();
            let cancel = monitor_cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => shared.rebalance(),
                    }
                }
            })
        };

        Ok(Self {
            shared,
            results_rx,
            monitor_cancel,
            monitor: Some(monitor),
        })
    }

    /// Enqueue without blocking. Fails only once the pool is closed.
    pub fn submit(&self, item: WorkItem) -> Result<(), SchedulerError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::QueueClosed);
        }
        self.shared.queue.lock().push_back(item);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Wait for the next chunk or completed item.
    pub async fn next_event(&mut self) -> Option<WorkEvent> {
        self.results_rx.recv().await
    }

    /// Events that have already arrived, without waiting.
    pub fn drain_events(&mut self) -> impl Iterator<Item = WorkEvent> + '_ {
        std::iter::from_fn(move || self.results_rx.try_recv().ok())
    }

    /// Remove queued items no worker has picked up yet.
    pub fn purge_pending(&self) -> Vec<WorkItem> {
        self.shared.queue.lock().drain(..).collect()
    }

    /// Stop accepting submissions. Queued items still run.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue_depth()
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.lock().len()
    }

    /// Most workers alive at the same time.
    pub fn high_water_mark(&self) -> usize {
        self.shared.high_water.load(Ordering::Relaxed)
    }

    /// Close, let workers finish what is queued, and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.close();
        self.monitor_cancel.cancel();
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.await;
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.shared.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.monitor_cancel.cancel();
        for slot in self.shared.workers.lock().values() {
            slot.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime_context::RuntimeContext;
    use crate::core::variable_pool::PoolView;
    use crate::dsl::NodeType;
    use crate::error::{NodeError, NodeResult};
    use crate::nodes::NodeRunResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Sleepy(u64);

    #[async_trait]
    impl Node for Sleepy {
        async fn run(&self, inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            let mut outputs = std::collections::HashMap::new();
            outputs.insert("id".to_string(), json!(inputs.node_id));
            Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)))
        }
    }

    /// Streams each configured word, then succeeds.
    struct Chatty(Vec<&'static str>);

    #[async_trait]
    impl Node for Chatty {
        async fn run(&self, inputs: NodeInputs, ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
            let selector = crate::domain::model::Selector::new(inputs.node_id, "text");
            for (i, word) in self.0.iter().enumerate() {
                ctx.stream_chunk(selector.clone(), json!(word), i + 1 == self.0.len());
            }
            Ok(NodeOutcome::Succeeded(NodeRunResult::default()))
        }
    }

    struct Panicky;

    #[async_trait]
    impl Node for Panicky {
        async fn run(&self, _inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
            panic!("kaboom");
        }
    }

    struct Broken;

    #[async_trait]
    impl Node for Broken {
        async fn run(&self, _inputs: NodeInputs, _ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
            Err(NodeError::ExecutionError("bad".into()))
        }
    }

    fn item(id: &str, node: Arc<dyn Node>, timeout: Option<Duration>) -> WorkItem {
        WorkItem {
            node_id: id.to_string(),
            attempt: 1,
            node,
            inputs: NodeInputs {
                node_id: id.to_string(),
                node_type: NodeType::Code,
                title: id.to_string(),
                config: Value::Null,
                pool: PoolView::default(),
            },
            ctx: RuntimeContext::default().execution_context("e1", "wf", id, 1),
            timeout,
            delay: None,
        }
    }

    fn fast_config(min: usize, max: usize, threshold: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            min_workers: min,
            max_workers: max,
            scale_up_threshold: threshold,
            scale_down_idle_time_secs: 0.05,
            scale_check_interval_ms: 10,
        }
    }

    async fn next_done(pool: &mut WorkerPool) -> WorkResult {
        loop {
            match pool.next_event().await {
                Some(WorkEvent::Done(result)) => return result,
                Some(WorkEvent::Chunk { .. }) => continue,
                None => panic!("pool closed"),
            }
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WorkerPoolConfig::default().validate().is_ok());
        assert!(fast_config(0, 1, 1).validate().is_err());
        assert!(matches!(
            fast_config(3, 2, 1).validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_idle_time_must_fit_a_duration() {
        for bad in [1e300, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = fast_config(1, 2, 1);
            config.scale_down_idle_time_secs = bad;
            assert!(
                matches!(config.validate(), Err(SchedulerError::InvalidConfig(_))),
                "{} accepted",
                bad
            );
        }
        let mut config = fast_config(1, 2, 1);
        config.scale_down_idle_time_secs = 1e9;
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_limit(), Duration::from_secs(1_000_000_000));
    }

    #[tokio::test]
    async fn test_huge_idle_time_keeps_extra_workers() {
        let mut config = fast_config(1, 2, 1);
        config.scale_down_idle_time_secs = 1e9;
        let mut pool = WorkerPool::start(config).unwrap();
        let node: Arc<dyn Node> = Arc::new(Sleepy(40));
        for i in 0..3 {
            pool.submit(item(&format!("n{}", i), node.clone(), None)).unwrap();
        }
        for _ in 0..3 {
            next_done(&mut pool).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.high_water_mark(), 2);
        assert_eq!(pool.worker_count(), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_chunks_arrive_before_the_result() {
        let mut pool = WorkerPool::start(fast_config(1, 1, 1)).unwrap();
        pool.submit(item("talk", Arc::new(Chatty(vec!["a", "b", "c"])), None))
            .unwrap();
        let mut seen = Vec::new();
        loop {
            match pool.next_event().await.unwrap() {
                WorkEvent::Chunk {
                    node_id,
                    attempt,
                    chunk,
                } => {
                    assert_eq!(node_id, "talk");
                    assert_eq!(attempt, 1);
                    seen.push((chunk.chunk, chunk.is_final));
                }
                WorkEvent::Done(result) => {
                    assert!(matches!(result.outcome, NodeOutcome::Succeeded(_)));
                    break;
                }
            }
        }
        assert_eq!(
            seen,
            vec![(json!("a"), false), (json!("b"), false), (json!("c"), true)]
        );
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_lazy_start_with_min_workers() {
        let pool = WorkerPool::start(fast_config(1, 4, 2)).unwrap();
        assert_eq!(pool.worker_count(), 1);
        assert_eq!(pool.high_water_mark(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_scales_up_under_load_and_back_down() {
        let mut pool = WorkerPool::start(fast_config(1, 3, 2)).unwrap();
        let node: Arc<dyn Node> = Arc::new(Sleepy(60));
        for i in 0..5 {
            pool.submit(item(&format!("n{}", i), node.clone(), None)).unwrap();
        }
        let mut done = Vec::new();
        while done.len() < 5 {
            let r = next_done(&mut pool).await;
            assert!(matches!(r.outcome, NodeOutcome::Succeeded(_)));
            done.push(r.node_id);
        }
        assert!(pool.high_water_mark() > 1);
        assert!(pool.high_water_mark() <= 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_and_panic_become_failures() {
        let mut pool = WorkerPool::start(fast_config(2, 2, 1)).unwrap();
        pool.submit(item("slow", Arc::new(Sleepy(500)), Some(Duration::from_millis(20))))
            .unwrap();
        pool.submit(item("panic", Arc::new(Panicky), None)).unwrap();
        pool.submit(item("err", Arc::new(Broken), None)).unwrap();

        let mut kinds = HashMap::new();
        for _ in 0..3 {
            let r = next_done(&mut pool).await;
            match r.outcome {
                NodeOutcome::Failed { error_kind, .. } => {
                    kinds.insert(r.node_id, error_kind);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(kinds["slow"], ErrorCode::Timeout);
        assert_eq!(kinds["panic"], ErrorCode::InternalError);
        assert_eq!(kinds["err"], ErrorCode::ExecutionError);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let pool = WorkerPool::start(fast_config(1, 1, 1)).unwrap();
        pool.close();
        let err = pool
            .submit(item("late", Arc::new(Sleepy(1)), None))
            .unwrap_err();
        assert_eq!(err, SchedulerError::QueueClosed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_purge_pending_returns_unstarted_items() {
        let mut pool = WorkerPool::start(fast_config(1, 1, 100)).unwrap();
        let node: Arc<dyn Node> = Arc::new(Sleepy(100));
        for i in 0..3 {
            pool.submit(item(&format!("n{}", i), node.clone(), None)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.close();
        let purged = pool.purge_pending();
        assert_eq!(purged.len(), 2);
        let r = next_done(&mut pool).await;
        assert_eq!(r.node_id, "n0");
        assert_eq!(pool.drain_events().count(), 0);
        pool.shutdown().await;
    }
}
