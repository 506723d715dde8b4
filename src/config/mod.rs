//! Engine configuration
//!
//! Configuration can be built in code, parsed from TOML/YAML files via
//! [`loader`], or assembled from CLI flags. Every path ends in `validate()`
//! before an engine accepts it.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;

#[cfg(test)]
mod tests;

pub use loader::load_engine_config;

/// How worker processes are created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IsolationBackend {
    /// Re-execute the running binary with the given arguments
    CurrentExe {
        #[serde(default)]
        args: Vec<String>,
    },
    /// Launch a dedicated worker program
    Program {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for IsolationBackend {
    fn default() -> Self {
        Self::CurrentExe { args: Vec::new() }
    }
}

impl IsolationBackend {
    pub fn program(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self::Program {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Resolve the program and arguments a worker is started with
    pub fn command_line(&self) -> EngineResult<(PathBuf, Vec<String>)> {
        match self {
            Self::CurrentExe { args } => {
                let exe = std::env::current_exe().map_err(|source| EngineError::Spawn {
                    program: "<current executable>".to_string(),
                    source,
                })?;
                Ok((exe, args.clone()))
            }
            Self::Program { program, args } => Ok((program.clone(), args.clone())),
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if let Self::Program { program, .. } = self {
            if program.as_os_str().is_empty() {
                return Err(EngineError::invalid(
                    "isolation_backend.program",
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Order of the failure list in the returned accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrder {
    /// Stable-sorted by position of the originating input
    #[default]
    Input,
    /// As observed; not deterministic when tasks fail concurrently
    Completion,
}

/// Configuration for [`crate::engine::ProcessPerTask`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessPerTaskConfig {
    /// Maximum number of concurrently running worker processes
    pub parallelism: usize,

    /// Wall-clock budget of one attempt, after which its worker is killed
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,

    /// Extra attempts granted to a failing task
    #[serde(default)]
    pub task_retries: u32,

    #[serde(default)]
    pub isolation_backend: IsolationBackend,

    #[serde(default)]
    pub failure_order: FailureOrder,
}

impl ProcessPerTaskConfig {
    pub fn new(parallelism: usize, task_timeout: Duration) -> Self {
        Self {
            parallelism,
            task_timeout,
            task_retries: 0,
            isolation_backend: IsolationBackend::default(),
            failure_order: FailureOrder::default(),
        }
    }

    pub fn with_retries(mut self, task_retries: u32) -> Self {
        self.task_retries = task_retries;
        self
    }

    pub fn with_backend(mut self, backend: IsolationBackend) -> Self {
        self.isolation_backend = backend;
        self
    }

    pub fn with_failure_order(mut self, order: FailureOrder) -> Self {
        self.failure_order = order;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.parallelism == 0 {
            return Err(EngineError::invalid(
                "parallelism",
                "must be greater than zero",
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(EngineError::invalid(
                "task_timeout",
                "must be greater than zero",
            ));
        }
        self.isolation_backend.validate()
    }
}

/// Configuration for [`crate::engine::SharedPool`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedPoolConfig {
    /// Number of long-lived worker processes
    pub parallelism: usize,

    /// Tasks a worker serves before it is replaced; unlimited when absent
    #[serde(default)]
    pub worker_recycle_limit: Option<usize>,

    /// Extra attempts granted to a failing task
    #[serde(default)]
    pub task_retries: u32,

    /// Deadline for the whole batch; unlimited when absent
    #[serde(default, with = "humantime_serde")]
    pub total_timeout: Option<Duration>,

    #[serde(default)]
    pub isolation_backend: IsolationBackend,

    #[serde(default)]
    pub failure_order: FailureOrder,
}

impl SharedPoolConfig {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism,
            worker_recycle_limit: None,
            task_retries: 0,
            total_timeout: None,
            isolation_backend: IsolationBackend::default(),
            failure_order: FailureOrder::default(),
        }
    }

    pub fn with_recycle_limit(mut self, limit: usize) -> Self {
        self.worker_recycle_limit = Some(limit);
        self
    }

    pub fn with_retries(mut self, task_retries: u32) -> Self {
        self.task_retries = task_retries;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    pub fn with_backend(mut self, backend: IsolationBackend) -> Self {
        self.isolation_backend = backend;
        self
    }

    pub fn with_failure_order(mut self, order: FailureOrder) -> Self {
        self.failure_order = order;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.parallelism == 0 {
            return Err(EngineError::invalid(
                "parallelism",
                "must be greater than zero",
            ));
        }
        if self.worker_recycle_limit == Some(0) {
            return Err(EngineError::invalid(
                "worker_recycle_limit",
                "must be greater than zero when set",
            ));
        }
        if self.total_timeout.is_some_and(|t| t.is_zero()) {
            return Err(EngineError::invalid(
                "total_timeout",
                "must be greater than zero when set",
            ));
        }
        self.isolation_backend.validate()
    }
}

/// Either engine's configuration, tagged by `engine` in files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum EngineConfig {
    PerTask(ProcessPerTaskConfig),
    SharedPool(SharedPoolConfig),
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Self::PerTask(config) => config.validate(),
            Self::SharedPool(config) => config.validate(),
        }
    }

    pub fn isolation_backend_mut(&mut self) -> &mut IsolationBackend {
        match self {
            Self::PerTask(config) => &mut config.isolation_backend,
            Self::SharedPool(config) => &mut config.isolation_backend,
        }
    }
}

impl From<ProcessPerTaskConfig> for EngineConfig {
    fn from(config: ProcessPerTaskConfig) -> Self {
        Self::PerTask(config)
    }
}

impl From<SharedPoolConfig> for EngineConfig {
    fn from(config: SharedPoolConfig) -> Self {
        Self::SharedPool(config)
    }
}
