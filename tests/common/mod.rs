#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use graphflow::core::{ExecutionContext, GraphEngineEvent, Layer, LayerResult, LoopCursor};
use graphflow::error::NodeResult;
use graphflow::{
    build_graph_from_dsl, DslFormat, Graph, Node, NodeError, NodeInputs, NodeOutcome, NodeRegistry,
    NodeRunResult, NodeType, Selector,
};

/// Test node registered as `code`. Behaviour is picked by the `op` config key:
///
/// - `emit`: outputs the `outputs` map as-is
/// - `double`: outputs `value = 2 * <input selector>`
/// - `fail`: always fails with `message`
/// - `fail_times`: after an optional `ms` pause, fails on the first `times`
///   attempts, then outputs `attempt`
/// - `sleep`: sleeps `ms` milliseconds, then outputs `value`
/// - `stream`: streams each of `chunks` under `<node>.text`, then outputs the
///   joined `text`
/// - `cursor`: reports a loop cursor at `index` of `length` and outputs `index`
#[derive(Default)]
pub struct ScriptNode {
    invocations: AtomicUsize,
}

impl ScriptNode {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Node for ScriptNode {
    async fn run(&self, inputs: NodeInputs, ctx: ExecutionContext) -> NodeResult<NodeOutcome> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let op: String = inputs.config_field("op")?.unwrap_or_else(|| "emit".to_string());
        let mut outputs = HashMap::new();
        match op.as_str() {
            "emit" => {
                outputs = inputs.config_field("outputs")?.unwrap_or_default();
            }
            "double" => {
                let selector: Selector = inputs
                    .config_field("input")?
                    .ok_or_else(|| NodeError::ConfigError("double needs an input".into()))?;
                let value = inputs
                    .variable(&selector)
                    .as_f64()
                    .ok_or_else(|| NodeError::TypeError(format!("{} is not a number", selector)))?;
                outputs.insert("value".to_string(), json!(value * 2.0));
            }
            "fail" => {
                let message: String = inputs
                    .config_field("message")?
                    .unwrap_or_else(|| "scripted failure".to_string());
                return Err(NodeError::ExecutionError(message));
            }
            "fail_times" => {
                if let Some(ms) = inputs.config_field::<u64>("ms")? {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                let times: u32 = inputs.config_field("times")?.unwrap_or(1);
                if ctx.attempt <= times {
                    return Err(NodeError::ExecutionError(format!(
                        "attempt {} failed",
                        ctx.attempt
                    )));
                }
                outputs.insert("attempt".to_string(), json!(ctx.attempt));
            }
            "sleep" => {
                let ms: u64 = inputs.config_field("ms")?.unwrap_or(10);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let value: Value = inputs.config_field("value")?.unwrap_or(Value::Null);
                outputs.insert("value".to_string(), value);
            }
            "stream" => {
                let chunks: Vec<String> = inputs.config_field("chunks")?.unwrap_or_default();
                let selector = Selector::new(inputs.node_id.clone(), "text");
                for (i, chunk) in chunks.iter().enumerate() {
                    ctx.stream_chunk(selector.clone(), json!(chunk), i + 1 == chunks.len());
                    tokio::task::yield_now().await;
                }
                outputs.insert("text".to_string(), json!(chunks.concat()));
            }
            "cursor" => {
                let index: usize = inputs.config_field("index")?.unwrap_or(0);
                let length: usize = inputs.config_field("length")?.unwrap_or(1);
                outputs.insert("index".to_string(), json!(index));
                let mut result = NodeRunResult::with_outputs(outputs);
                result.loop_cursor = Some(LoopCursor { index, length });
                return Ok(NodeOutcome::Succeeded(result));
            }
            other => return Err(NodeError::ConfigError(format!("unknown op '{}'", other))),
        }
        Ok(NodeOutcome::Succeeded(NodeRunResult::with_outputs(outputs)))
    }
}

pub fn registry_with_script() -> (Arc<NodeRegistry>, Arc<ScriptNode>) {
    let script = Arc::new(ScriptNode::default());
    let mut registry = NodeRegistry::with_builtins();
    registry.register(NodeType::Code, script.clone());
    (Arc::new(registry), script)
}

pub fn graph(yaml: &str) -> Arc<Graph> {
    Arc::new(build_graph_from_dsl(yaml, DslFormat::Yaml).expect("build graph"))
}

pub fn inputs(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Records every event name it sees; optionally fails on one of them, or on
/// `graph_end`.
#[derive(Clone, Default)]
pub struct RecordingLayer {
    pub events: Arc<Mutex<Vec<GraphEngineEvent>>>,
    pub ends: Arc<Mutex<Vec<Option<String>>>>,
    fail_on: Option<&'static str>,
    name: &'static str,
}

impl RecordingLayer {
    pub fn new() -> Self {
        Self {
            name: "recording",
            ..Self::default()
        }
    }

    pub fn failing_on(event_name: &'static str) -> Self {
        Self {
            name: "failing",
            fail_on: Some(event_name),
            ..Self::default()
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }
}

impl Layer for RecordingLayer {
    fn name(&self) -> &str {
        self.name
    }

    fn on_event(&mut self, event: &GraphEngineEvent) -> LayerResult {
        self.events.lock().push(event.clone());
        if self.fail_on == Some(event.name()) {
            return Err(format!("refusing {}", event.name()).into());
        }
        Ok(())
    }

    fn on_graph_end(&mut self, error: Option<&str>) -> LayerResult {
        self.ends.lock().push(error.map(str::to_string));
        if self.fail_on == Some("graph_end") {
            return Err("refusing graph end".into());
        }
        Ok(())
    }
}

pub async fn with_timeout<F, T>(label: &str, duration: Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, f)
        .await
        .unwrap_or_else(|_| panic!("'{}' timed out after {:?}", label, duration))
}

pub const LINEAR_DOUBLE_YAML: &str = r#"
version: "0.1.0"
nodes:
  - id: start
    data:
      type: start
      variables:
        - variable: n
          required: true
  - id: double
    data:
      type: code
      op: double
      input: ["start", "n"]
  - id: end
    data:
      type: end
      outputs:
        - variable: result
          value_selector: ["double", "value"]
edges:
  - source: start
    target: double
  - source: double
    target: end
"#;
