//! Error types
//!
//! Two layers of failure exist. [`TaskError`] describes why a single task did
//! not produce a value; it is serializable so it can cross the worker process
//! boundary and is always recovered into the accumulator. [`EngineError`] is
//! fatal for the whole map-reduce call.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod codes;
mod task;

pub use codes::{describe_error_code, ErrorCode};
pub use task::TaskError;

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Conditions that abort an entire map-reduce call
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("[E{code:04}] Invalid configuration for `{field}`: {reason}", code = ErrorCode::CONFIG_INVALID_VALUE)]
    InvalidConfiguration { field: String, reason: String },

    #[error("[E{code:04}] Failed to load configuration from {}: {message}", .path.display())]
    ConfigLoad {
        code: u16,
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Failed to spawn worker process `{program}`", code = ErrorCode::EXEC_SPAWN_FAILED)]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Worker pipe failed while {operation} for task {task_id}", code = ErrorCode::EXEC_PIPE_ERROR)]
    Pipe {
        task_id: u64,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[E{code:04}] Failed to encode {what} for transport", code = ErrorCode::EXEC_ENCODE_ERROR)]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "[E{code:04}] Worker process {} of task {task_id} failed to terminate within {grace:?}",
        .pid.map(|p| p.to_string()).unwrap_or_else(|| "<unknown>".to_string()),
        code = ErrorCode::EXEC_REAP_FAILED
    )]
    ReapFailed {
        task_id: u64,
        pid: Option<u32>,
        grace: Duration,
    },

    #[error(
        "[E{code:04}] Total timeout of {timeout:?} elapsed with {outstanding} task(s) still outstanding",
        code = ErrorCode::EXEC_BATCH_TIMEOUT
    )]
    BatchTimeout {
        timeout: Duration,
        outstanding: usize,
    },

    #[error("[E{code:04}] Internal error: {message}", code = ErrorCode::OTHER_INTERNAL_ERROR)]
    Internal { message: String },
}

impl EngineError {
    /// Create a configuration validation error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the numeric error code
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidConfiguration { .. } => ErrorCode::CONFIG_INVALID_VALUE,
            Self::ConfigLoad { code, .. } => *code,
            Self::Spawn { .. } => ErrorCode::EXEC_SPAWN_FAILED,
            Self::Pipe { .. } => ErrorCode::EXEC_PIPE_ERROR,
            Self::Encode { .. } => ErrorCode::EXEC_ENCODE_ERROR,
            Self::ReapFailed { .. } => ErrorCode::EXEC_REAP_FAILED,
            Self::BatchTimeout { .. } => ErrorCode::EXEC_BATCH_TIMEOUT,
            Self::Internal { .. } => ErrorCode::OTHER_INTERNAL_ERROR,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfiguration { .. } | Self::ConfigLoad { .. } => 2,
            Self::BatchTimeout { .. } => 4,
            Self::Spawn { .. } | Self::Pipe { .. } | Self::Encode { .. } => 5,
            Self::ReapFailed { .. } | Self::Internal { .. } => 1,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidConfiguration { field, reason } => {
                format!("Configuration problem: `{}` {}", field, reason)
            }
            Self::ConfigLoad { path, message, .. } => {
                format!("Could not load {}: {}", path.display(), message)
            }
            Self::BatchTimeout {
                timeout,
                outstanding,
            } => format!(
                "The batch did not finish within {:?}; {} task(s) were abandoned",
                timeout, outstanding
            ),
            other => format!("{} ({})", other, describe_error_code(other.code())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_display_carries_code() {
        let err = EngineError::invalid("parallelism", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "[E1005] Invalid configuration for `parallelism`: must be greater than zero"
        );
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_batch_timeout_code_and_exit() {
        let err = EngineError::BatchTimeout {
            timeout: Duration::from_secs(2),
            outstanding: 3,
        };
        assert_eq!(err.code(), ErrorCode::EXEC_BATCH_TIMEOUT);
        assert_eq!(err.exit_code(), 4);
        assert!(err.user_message().contains("3 task(s)"));
    }

    #[test]
    fn test_reap_failed_without_pid() {
        let err = EngineError::ReapFailed {
            task_id: 7,
            pid: None,
            grace: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("<unknown>"));
        assert!(err.to_string().contains("task 7"));
    }
}
