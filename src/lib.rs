//! # procmap
//!
//! Local parallel map-reduce over OS processes.
//!
//! A [`task::TaskFunction`] is applied to every input in a separate worker
//! process; per-task outcomes are folded with an associative
//! [`monoid::Monoid`] into an [`accumulator::MaybeResult`], which keeps the
//! combined value of everything that succeeded next to the list of tasks that
//! failed, timed out or crashed.
//!
//! ```no_run
//! use procmap::config::{IsolationBackend, ProcessPerTaskConfig};
//! use procmap::engine::{mapreduce, ProcessPerTask};
//! use procmap::probes::Double;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProcessPerTaskConfig::new(4, Duration::from_secs(30))
//!     .with_backend(IsolationBackend::program("procmap", &["worker"]));
//! let engine = ProcessPerTask::new(config)?;
//! let outcome = mapreduce(Double, vec![1, 2, 3], &engine).await?;
//! assert_eq!(outcome.result.map(|sum| sum.0), Some(12));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `monoid` - Combinable values and `msum`
//! - `accumulator` - `MaybeResult` and `Failure`
//! - `task` - The `TaskFunction` contract
//! - `worker` - Worker registry, wire protocol, serve loop and process handles
//! - `engine` - Per-task-process and shared-pool engines
//! - `config` - Engine configuration and file loading
//! - `error` - Task failure causes and fatal engine errors
//! - `probes` - Built-in task functions for smoke tests
//! - `app`, `cli` - The `procmap` binary

pub mod accumulator;
pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod monoid;
pub mod probes;
pub mod task;
pub mod worker;

pub use accumulator::{Failure, MaybeResult};
pub use config::{EngineConfig, FailureOrder, IsolationBackend, ProcessPerTaskConfig, SharedPoolConfig};
pub use engine::{mapreduce, Engine, Executor, ProcessPerTask, SharedPool};
pub use error::{EngineError, EngineResult, TaskError};
pub use monoid::{msum, Monoid, Sum};
pub use task::TaskFunction;
