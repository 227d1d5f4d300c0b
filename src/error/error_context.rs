use std::fmt;

use serde::{Deserialize, Serialize};

/// Error retryability marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRetryability {
    Retryable,
    NonRetryable,
    Unknown,
}

/// Error severity marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

/// Error classification code, used as the `error_kind` of a failed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ConfigError,
    TypeError,
    Timeout,
    SerializationError,
    InternalError,
    ExecutionError,
    NetworkError,
    VariableNotFound,
    InputValidationError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigError => "config_error",
            ErrorCode::TypeError => "type_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::SerializationError => "serialization_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ExecutionError => "execution_error",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::VariableNotFound => "variable_not_found",
            ErrorCode::InputValidationError => "input_validation_error",
        }
    }

    /// Default retryability for failures of this kind.
    pub fn default_retryability(&self) -> ErrorRetryability {
        match self {
            ErrorCode::Timeout | ErrorCode::NetworkError => ErrorRetryability::Retryable,
            ErrorCode::ExecutionError | ErrorCode::InternalError => ErrorRetryability::Unknown,
            _ => ErrorRetryability::NonRetryable,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub retryability: ErrorRetryability,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ErrorContext {
    pub fn non_retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_retryability(code, ErrorRetryability::NonRetryable, message)
    }

    pub fn retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_retryability(code, ErrorRetryability::Retryable, message)
    }

    /// Context classified by the code's default retryability.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_retryability(code, code.default_retryability(), message)
    }

    fn with_retryability(
        code: ErrorCode,
        retryability: ErrorRetryability,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            retryability,
            severity: ErrorSeverity::Error,
            message: message.into(),
            retry_after_secs: None,
            metadata: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryability != ErrorRetryability::NonRetryable
    }
}
