use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::model::Selector;
use crate::dsl::{ErrorStrategyType, NodeType};
use crate::error::ErrorCode;

/// Why a run paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PauseReason {
    /// A decision hook asked to suspend before the node ran.
    Hook { hook: String },
    /// The node itself returned a paused outcome.
    NodePaused { resume_hint: Value },
}

/// Engine lifecycle events, emitted only from the decision loop.
///
/// For a single node `NodeRunStarted` always precedes its stream chunks, and
/// the chunks precede its terminal event. The run-level terminal event is
/// always the last one of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEngineEvent {
    GraphRunStarted {
        execution_id: String,
        workflow_id: String,
        resumed: bool,
    },
    GraphRunSucceeded {
        outputs: HashMap<String, Value>,
    },
    GraphRunPartialSucceeded {
        outputs: HashMap<String, Value>,
        exceptions_count: u32,
        error: Option<String>,
    },
    GraphRunFailed {
        error: String,
        exceptions_count: u32,
    },
    GraphRunStopped {
        reason: String,
    },
    GraphRunPaused {
        suspension_id: String,
        next_node_id: String,
        reason: PauseReason,
    },

    NodeRunStarted {
        node_id: String,
        node_type: NodeType,
        node_title: String,
        attempt: u32,
        parallel_id: Option<String>,
    },
    /// Partial output of a running node, forwarded in the order it was sent.
    NodeRunStreamChunk {
        node_id: String,
        selector: Selector,
        chunk: Value,
        is_final: bool,
    },
    NodeRunSucceeded {
        node_id: String,
        node_type: NodeType,
        outputs: HashMap<String, Value>,
        edge_source_handle: Option<String>,
        elapsed_ms: u64,
    },
    NodeRunFailed {
        node_id: String,
        node_type: NodeType,
        error_kind: ErrorCode,
        message: String,
        elapsed_ms: u64,
    },
    /// The node failed but its error strategy recovered it.
    NodeRunException {
        node_id: String,
        node_type: NodeType,
        error_kind: ErrorCode,
        message: String,
        strategy: ErrorStrategyType,
    },
    NodeRunRetried {
        node_id: String,
        node_type: NodeType,
        attempt: u32,
        error_kind: ErrorCode,
        message: String,
        retry_delay_ms: u64,
    },
    NodeRunPaused {
        node_id: String,
        node_type: NodeType,
        resume_hint: Value,
    },
}

impl GraphEngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GraphEngineEvent::GraphRunStarted { .. } => "graph_run_started",
            GraphEngineEvent::GraphRunSucceeded { .. } => "graph_run_succeeded",
            GraphEngineEvent::GraphRunPartialSucceeded { .. } => "graph_run_partial_succeeded",
            GraphEngineEvent::GraphRunFailed { .. } => "graph_run_failed",
            GraphEngineEvent::GraphRunStopped { .. } => "graph_run_stopped",
            GraphEngineEvent::GraphRunPaused { .. } => "graph_run_paused",
            GraphEngineEvent::NodeRunStarted { .. } => "node_run_started",
            GraphEngineEvent::NodeRunStreamChunk { .. } => "node_run_stream_chunk",
            GraphEngineEvent::NodeRunSucceeded { .. } => "node_run_succeeded",
            GraphEngineEvent::NodeRunFailed { .. } => "node_run_failed",
            GraphEngineEvent::NodeRunException { .. } => "node_run_exception",
            GraphEngineEvent::NodeRunRetried { .. } => "node_run_retried",
            GraphEngineEvent::NodeRunPaused { .. } => "node_run_paused",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            GraphEngineEvent::NodeRunStarted { node_id, .. }
            | GraphEngineEvent::NodeRunStreamChunk { node_id, .. }
            | GraphEngineEvent::NodeRunSucceeded { node_id, .. }
            | GraphEngineEvent::NodeRunFailed { node_id, .. }
            | GraphEngineEvent::NodeRunException { node_id, .. }
            | GraphEngineEvent::NodeRunRetried { node_id, .. }
            | GraphEngineEvent::NodeRunPaused { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Run-level terminal event (nothing follows it in a run).
    pub fn is_graph_terminal(&self) -> bool {
        matches!(
            self,
            GraphEngineEvent::GraphRunSucceeded { .. }
                | GraphEngineEvent::GraphRunPartialSucceeded { .. }
                | GraphEngineEvent::GraphRunFailed { .. }
                | GraphEngineEvent::GraphRunStopped { .. }
                | GraphEngineEvent::GraphRunPaused { .. }
        )
    }

    /// Node-level terminal event. A recovered exception counts as terminal.
    pub fn is_node_terminal(&self) -> bool {
        matches!(
            self,
            GraphEngineEvent::NodeRunSucceeded { .. }
                | GraphEngineEvent::NodeRunFailed { .. }
                | GraphEngineEvent::NodeRunException { .. }
                | GraphEngineEvent::NodeRunPaused { .. }
        )
    }
}

/// Sender wrapper for engine events, with an atomic active flag so that event
/// emission can be cheaply skipped when no listener is attached.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<GraphEngineEvent>,
    active: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<GraphEngineEvent>, active: Arc<AtomicBool>) -> Self {
        Self { tx, active }
    }

    /// Emitter plus receiver, active from the start.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GraphEngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, Arc::new(AtomicBool::new(true))), rx)
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    pub async fn emit(&self, event: GraphEngineEvent) {
        if self.is_active() && self.tx.send(event).await.is_err() {
            // receiver dropped
            self.set_active(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emitter_inactive() {
        let (tx, mut rx) = mpsc::channel(10);
        let emitter = EventEmitter::new(tx, Arc::new(AtomicBool::new(false)));
        emitter
            .emit(GraphEngineEvent::GraphRunStopped { reason: "x".into() })
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emitter_disables_itself_when_receiver_drops() {
        let (emitter, rx) = EventEmitter::channel(4);
        drop(rx);
        emitter
            .emit(GraphEngineEvent::GraphRunStopped { reason: "x".into() })
            .await;
        assert!(!emitter.is_active());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = GraphEngineEvent::NodeRunFailed {
            node_id: "b".into(),
            node_type: NodeType::Code,
            error_kind: ErrorCode::Timeout,
            message: "took too long".into(),
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_run_failed");
        assert_eq!(json["error_kind"], "timeout");
        assert_eq!(json["node_type"], "code");
        assert!(event.is_node_terminal());
        assert!(!event.is_graph_terminal());
        assert_eq!(event.node_id(), Some("b"));
    }

    #[test]
    fn test_paused_event_is_graph_terminal() {
        let event = GraphEngineEvent::GraphRunPaused {
            suspension_id: "s".into(),
            next_node_id: "n".into(),
            reason: PauseReason::Hook { hook: "h".into() },
        };
        assert!(event.is_graph_terminal());
        assert_eq!(event.name(), "graph_run_paused");
    }

    #[test]
    fn test_stream_chunk_is_not_terminal() {
        let event = GraphEngineEvent::NodeRunStreamChunk {
            node_id: "llm".into(),
            selector: Selector::new("llm", "text"),
            chunk: Value::from("Hel"),
            is_final: false,
        };
        assert!(!event.is_node_terminal());
        assert!(!event.is_graph_terminal());
        assert_eq!(event.node_id(), Some("llm"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_run_stream_chunk");
        assert_eq!(json["selector"], serde_json::json!(["llm", "text"]));
    }
}
