//! Per-task failure causes

use crate::worker::ExitInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a single task did not contribute a clean value.
///
/// Travels over the worker protocol, so it carries rendered messages rather
/// than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// The task function returned an error
    #[error("{message}")]
    Callee { message: String },

    /// The task function panicked inside the worker
    #[error("task panicked: {message}")]
    Panicked { message: String },

    /// The worker exited with a non-zero status after the task was handed to it
    #[error("worker exited with {exit}")]
    NonZeroExit { exit: ExitInfo },

    /// The task ran past its deadline and its worker was killed
    #[error("task exceeded its timeout of {timeout:?}")]
    TimedOut {
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },

    /// The worker went away without answering
    #[error("worker exited without delivering a result ({exit})")]
    WorkerLost { exit: ExitInfo },

    /// A payload, argument or value could not be (de)serialized
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// The worker has no function registered under the requested name
    #[error("function `{name}` is not registered in the worker")]
    UnknownFunction { name: String },
}

impl TaskError {
    /// Wrap an error returned by a task function, keeping its context chain
    pub fn callee(err: &anyhow::Error) -> Self {
        Self::Callee {
            message: format!("{:#}", err),
        }
    }

    pub fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Short label used in log lines and failure origins
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Callee { .. } => "failure",
            Self::Panicked { .. } => "panic",
            Self::NonZeroExit { .. } => "non-zero exit",
            Self::TimedOut { .. } => "timeout",
            Self::WorkerLost { .. } => "worker lost",
            Self::Decode { .. } => "decode failure",
            Self::UnknownFunction { .. } => "unknown function",
        }
    }
}
