use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::mpsc;

use super::cache::ResourceCache;
use super::worker_pool::WorkEvent;
use crate::domain::model::Selector;
use crate::nodes::StreamChunk;

/// Process-wide services shared by every run an engine performs.
#[derive(Clone)]
pub struct RuntimeContext {
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub cache: ResourceCache,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self {
            time_provider: Arc::new(RealTimeProvider),
            id_generator: Arc::new(RealIdGenerator),
            cache: ResourceCache::new(),
            tenant_id: None,
            user_id: None,
        }
    }
}

impl RuntimeContext {
    pub fn with_tenant(mut self, tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    pub fn with_id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn with_cache(mut self, cache: ResourceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Build the context handed to one node invocation.
    pub fn execution_context(
        &self,
        execution_id: &str,
        workflow_id: &str,
        node_id: &str,
        attempt: u32,
    ) -> ExecutionContext {
        ExecutionContext {
            execution_id: execution_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node_id.to_string(),
            tenant_id: self.tenant_id.clone(),
            user_id: self.user_id.clone(),
            attempt,
            cache: self.cache.clone(),
            time_provider: self.time_provider.clone(),
            id_generator: self.id_generator.clone(),
            stream: ChunkSink::default(),
        }
    }
}

/// Channel back to the decision loop for a node's stream chunks.
///
/// Workers attach a connected sink before running a node. A detached sink
/// (the default) drops every chunk.
#[derive(Clone, Default)]
pub struct ChunkSink {
    tx: Option<mpsc::UnboundedSender<WorkEvent>>,
    node_id: String,
    attempt: u32,
}

impl ChunkSink {
    pub fn new(tx: mpsc::UnboundedSender<WorkEvent>, node_id: String, attempt: u32) -> Self {
        Self {
            tx: Some(tx),
            node_id,
            attempt,
        }
    }

    /// False when the sink is detached or the loop has gone away.
    pub fn send(&self, chunk: StreamChunk) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        tx.send(WorkEvent::Chunk {
            node_id: self.node_id.clone(),
            attempt: self.attempt,
            chunk,
        })
        .is_ok()
    }
}

/// Everything a node may know about the run it belongs to.
///
/// Passed by value into each worker invocation; nodes never read tenant or
/// run identity from ambient state.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub node_id: String,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    /// 1 for the first run of a node, incremented per retry.
    pub attempt: u32,
    pub cache: ResourceCache,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub stream: ChunkSink,
}

impl ExecutionContext {
    /// Publish partial output. Chunks reach listeners in call order, all
    /// before the node's own succeeded or failed event.
    pub fn stream_chunk(&self, selector: Selector, chunk: Value, is_final: bool) -> bool {
        self.stream.send(StreamChunk {
            selector,
            chunk,
            is_final,
        })
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("workflow_id", &self.workflow_id)
            .field("node_id", &self.node_id)
            .field("tenant_id", &self.tenant_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

pub trait TimeProvider: Send + Sync {
    fn now_timestamp(&self) -> i64;
    fn now_millis(&self) -> i64;
    fn elapsed_secs(&self, since: i64) -> u64 {
        let now = self.now_timestamp();
        if now >= since {
            (now - since) as u64
        } else {
            0
        }
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

// --- Real implementations ---

#[derive(Debug, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now_timestamp(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

#[derive(Debug, Default)]
pub struct RealIdGenerator;

impl IdGenerator for RealIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// --- Fake implementations ---

pub struct FakeTimeProvider {
    pub fixed_timestamp: i64,
}

impl FakeTimeProvider {
    pub fn new(fixed_timestamp: i64) -> Self {
        Self { fixed_timestamp }
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now_timestamp(&self) -> i64 {
        self.fixed_timestamp
    }

    fn now_millis(&self) -> i64 {
        self.fixed_timestamp.saturating_mul(1000)
    }
}

pub struct FakeIdGenerator {
    pub prefix: String,
    pub counter: AtomicU64,
}

impl FakeIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for FakeIdGenerator {
    fn next_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, id)
    }
}
