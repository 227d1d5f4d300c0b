use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::model::Selector;
use crate::error::{WorkflowError, WorkflowResult};

/// External command to control a running engine. Commands are applied by the
/// decision loop itself, between iterations.
#[derive(Debug, Clone)]
pub enum Command {
    /// Stop dispatching, let in-flight nodes finish, end the run STOPPED.
    Stop { reason: Option<String> },
    /// Write values into the variable pool.
    UpdateVariables(Vec<(Selector, Value)>),
}

/// Cloneable handle for sending [`Command`]s to an engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, command: Command) -> WorkflowResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| WorkflowError::InternalError("engine is no longer running".to_string()))
    }

    pub async fn stop(&self, reason: impl Into<String>) -> WorkflowResult<()> {
        self.send(Command::Stop {
            reason: Some(reason.into()),
        })
        .await
    }

    pub async fn update_variables(&self, variables: Vec<(Selector, Value)>) -> WorkflowResult<()> {
        self.send(Command::UpdateVariables(variables)).await
    }
}
