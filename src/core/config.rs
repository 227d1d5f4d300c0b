use serde::{Deserialize, Serialize};

use crate::dsl::parser::{parse_document, DslFormat};
use crate::error::{WorkflowError, WorkflowResult};

pub use super::worker_pool::WorkerPoolConfig;

/// Configuration for the graph engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,
    /// Applied to nodes that declare no `timeout_secs` of their own.
    #[serde(default)]
    pub default_node_timeout_secs: Option<u64>,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
}

fn default_max_steps() -> u32 {
    500
}

fn default_max_execution_time_secs() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: default_max_steps(),
            max_execution_time_secs: default_max_execution_time_secs(),
            default_node_timeout_secs: None,
            worker_pool: WorkerPoolConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from YAML, JSON or TOML.
    pub fn from_str(content: &str, format: DslFormat) -> WorkflowResult<Self> {
        let config: EngineConfig = parse_document(content, format)
            .map_err(|e| WorkflowError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkflowResult<()> {
        if self.max_steps == 0 {
            return Err(WorkflowError::ConfigError(
                "max_steps must be at least 1".to_string(),
            ));
        }
        self.worker_pool.validate()?;
        Ok(())
    }
}
