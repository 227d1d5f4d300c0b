//! How the engine reacts when a node fails.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::dsl::{BackoffStrategy, ErrorStrategyType, RetryConfig};
use crate::error::{ErrorCode, ErrorContext};
use crate::graph::GraphNode;

/// A node failure as seen by the strategy.
#[derive(Debug)]
pub struct NodeFailure<'a> {
    pub node: &'a GraphNode,
    pub error_kind: ErrorCode,
    pub message: &'a str,
    /// 1-based attempt that just failed.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Run the node again after `delay`.
    Retry { delay: Duration },
    /// Recover by taking the node's `fail-branch` edges.
    FailBranch,
    /// Recover with these outputs and the node's normal edges.
    DefaultValue(HashMap<String, Value>),
    /// The node fails; everything reachable only through it is skipped.
    FailNode,
    /// The node fails and the whole run ends FAILED.
    AbortRun,
}

pub trait ErrorStrategy: Send + Sync {
    fn on_failure(&self, failure: &NodeFailure<'_>) -> Recovery;
}

/// Strategy driven by each node's declared `retry_config` and
/// `error_strategy`. Retries are exhausted first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfiguredErrorStrategy;

impl ErrorStrategy for ConfiguredErrorStrategy {
    fn on_failure(&self, failure: &NodeFailure<'_>) -> Recovery {
        if let Some(rc) = &failure.node.retry_config {
            let retries_used = failure.attempt.saturating_sub(1);
            let retryable = !rc.retry_on_retryable_only
                || ErrorContext::from_code(failure.error_kind, failure.message).is_retryable();
            if retries_used < rc.max_retries && retryable {
                return Recovery::Retry {
                    delay: Duration::from_millis(calculate_retry_interval(rc, retries_used)),
                };
            }
        }

        match failure.node.strategy_type() {
            ErrorStrategyType::None => Recovery::FailNode,
            ErrorStrategyType::FailBranch => Recovery::FailBranch,
            ErrorStrategyType::DefaultValue => Recovery::DefaultValue(
                failure
                    .node
                    .error_strategy
                    .as_ref()
                    .and_then(|s| s.default_value.clone())
                    .unwrap_or_default(),
            ),
            ErrorStrategyType::Abort => Recovery::AbortRun,
        }
    }
}

/// Backoff in milliseconds before retry number `retry` (0-based), capped at
/// `max_retry_interval`.
pub fn calculate_retry_interval(rc: &RetryConfig, retry: u32) -> u64 {
    let base = rc.retry_interval;
    let exponent = retry.min(i32::MAX as u32) as i32;
    let interval = match rc.backoff_strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Exponential => {
            let multiplied = base as f64 * rc.backoff_multiplier.powi(exponent);
            multiplied as u64
        }
        BackoffStrategy::ExponentialWithJitter => {
            let multiplied = base as f64 * rc.backoff_multiplier.powi(exponent);
            let jitter = rand::random::<f64>() * multiplied * 0.1;
            (multiplied + jitter) as u64
        }
    };

    interval.min(rc.max_retry_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{ErrorStrategyConfig, NodeType};
    use serde_json::json;

    fn rc(strategy: BackoffStrategy, interval: u64, multiplier: f64, cap: u64) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            retry_interval: interval,
            backoff_strategy: strategy,
            backoff_multiplier: multiplier,
            max_retry_interval: cap,
            retry_on_retryable_only: false,
        }
    }

    fn node(strategy: Option<ErrorStrategyType>, retry: Option<RetryConfig>) -> GraphNode {
        GraphNode {
            id: "n".into(),
            node_type: NodeType::Code,
            title: "n".into(),
            config: Value::Null,
            error_strategy: strategy.map(|t| ErrorStrategyConfig {
                strategy_type: t,
                default_value: Some(HashMap::from([("text".to_string(), json!("fallback"))])),
            }),
            retry_config: retry,
            timeout_secs: None,
        }
    }

    fn fail<'a>(node: &'a GraphNode, kind: ErrorCode, attempt: u32) -> NodeFailure<'a> {
        NodeFailure {
            node,
            error_kind: kind,
            message: "boom",
            attempt,
        }
    }

    #[test]
    fn test_calculate_retry_interval_fixed() {
        assert_eq!(calculate_retry_interval(&rc(BackoffStrategy::Fixed, 100, 2.0, 10000), 2), 100);
    }

    #[test]
    fn test_calculate_retry_interval_exponential() {
        let rc = rc(BackoffStrategy::Exponential, 100, 2.0, 10000);
        assert_eq!(calculate_retry_interval(&rc, 0), 100);
        assert_eq!(calculate_retry_interval(&rc, 1), 200);
        assert_eq!(calculate_retry_interval(&rc, 2), 400);
    }

    #[test]
    fn test_calculate_retry_interval_exponential_with_jitter() {
        let rc = rc(BackoffStrategy::ExponentialWithJitter, 100, 2.0, 10000);
        // Base is 100, jitter adds up to 10% → [100, 110]
        assert!((100..=110).contains(&calculate_retry_interval(&rc, 0)));
    }

    #[test]
    fn test_calculate_retry_interval_capped() {
        let rc = rc(BackoffStrategy::Exponential, 1000, 10.0, 5000);
        assert_eq!(calculate_retry_interval(&rc, 2), 5000);
    }

    #[test]
    fn test_retries_before_strategy() {
        let n = node(
            Some(ErrorStrategyType::FailBranch),
            Some(rc(BackoffStrategy::Fixed, 10, 1.0, 100)),
        );
        let s = ConfiguredErrorStrategy;
        for attempt in 1..=3 {
            assert_eq!(
                s.on_failure(&fail(&n, ErrorCode::ExecutionError, attempt)),
                Recovery::Retry {
                    delay: Duration::from_millis(10)
                }
            );
        }
        assert_eq!(
            s.on_failure(&fail(&n, ErrorCode::ExecutionError, 4)),
            Recovery::FailBranch
        );
    }

    #[test]
    fn test_retry_on_retryable_only() {
        let mut retry = rc(BackoffStrategy::Fixed, 10, 1.0, 100);
        retry.retry_on_retryable_only = true;
        let n = node(None, Some(retry));
        let s = ConfiguredErrorStrategy;
        assert_eq!(
            s.on_failure(&fail(&n, ErrorCode::ConfigError, 1)),
            Recovery::FailNode
        );
        assert!(matches!(
            s.on_failure(&fail(&n, ErrorCode::Timeout, 1)),
            Recovery::Retry { .. }
        ));
    }

    #[test]
    fn test_strategy_types() {
        let s = ConfiguredErrorStrategy;
        let none = node(None, None);
        assert_eq!(s.on_failure(&fail(&none, ErrorCode::ExecutionError, 1)), Recovery::FailNode);

        let abort = node(Some(ErrorStrategyType::Abort), None);
        assert_eq!(s.on_failure(&fail(&abort, ErrorCode::ExecutionError, 1)), Recovery::AbortRun);

        let default = node(Some(ErrorStrategyType::DefaultValue), None);
        match s.on_failure(&fail(&default, ErrorCode::ExecutionError, 1)) {
            Recovery::DefaultValue(values) => assert_eq!(values["text"], json!("fallback")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
