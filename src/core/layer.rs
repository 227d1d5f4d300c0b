//! Layers observe the engine lifecycle from inside the decision loop.
//!
//! Calls are synchronous and happen in registration order. A layer error is
//! fatal to the run: the engine stops dispatching, stops calling layers, and
//! ends the run FAILED.

use tracing::{debug, info, warn};

use super::event_bus::GraphEngineEvent;

pub type LayerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub trait Layer: Send {
    fn name(&self) -> &str;

    fn on_graph_start(&mut self) -> LayerResult {
        Ok(())
    }

    fn on_event(&mut self, _event: &GraphEngineEvent) -> LayerResult {
        Ok(())
    }

    /// Called once after the run-level terminal event. `error` carries the
    /// aggregate error of a failed or partially succeeded run.
    fn on_graph_end(&mut self, _error: Option<&str>) -> LayerResult {
        Ok(())
    }
}

/// Mirrors every engine event into `tracing`.
#[derive(Debug, Default)]
pub struct TracingLayer;

impl Layer for TracingLayer {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_graph_start(&mut self) -> LayerResult {
        debug!("graph run starting");
        Ok(())
    }

    fn on_event(&mut self, event: &GraphEngineEvent) -> LayerResult {
        match event {
            GraphEngineEvent::NodeRunFailed {
                node_id,
                error_kind,
                message,
                ..
            } => warn!(node_id = %node_id, error_kind = %error_kind, "{}", message),
            GraphEngineEvent::NodeRunRetried {
                node_id, attempt, ..
            } => info!(node_id = %node_id, attempt, "node retried"),
            GraphEngineEvent::GraphRunFailed { error, .. } => warn!(error = %error, "graph run failed"),
            other => match other.node_id() {
                Some(node_id) => debug!(node_id = %node_id, event = other.name()),
                None => info!(event = other.name()),
            },
        }
        Ok(())
    }

    fn on_graph_end(&mut self, error: Option<&str>) -> LayerResult {
        match error {
            Some(e) => info!(error = %e, "graph run ended with errors"),
            None => debug!("graph run ended"),
        }
        Ok(())
    }
}

/// Calls layers in order and remembers the first failure.
pub(crate) struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
    failed: bool,
}

impl LayerStack {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self {
            layers,
            failed: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Returns `(layer name, message)` of the first layer that errored.
    pub fn dispatch<F>(&mut self, mut call: F) -> Result<(), (String, String)>
    where
        F: FnMut(&mut dyn Layer) -> LayerResult,
    {
        if self.failed {
            return Ok(());
        }
        for layer in self.layers.iter_mut() {
            if let Err(e) = call(layer.as_mut()) {
                self.failed = true;
                return Err((layer.name().to_string(), e.to_string()));
            }
        }
        Ok(())
    }
}
