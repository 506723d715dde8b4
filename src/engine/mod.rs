//! Map-reduce engines
//!
//! An [`Engine`] runs a [`TaskFunction`] over every input in a separate OS
//! process and folds the per-task outcomes into one [`MaybeResult`]. Task
//! failures are recovered into the accumulator; only conditions that make the
//! whole batch meaningless surface as [`EngineError`]s.
//!
//! Two engines exist:
//! - [`ProcessPerTask`] starts a fresh process for every task attempt and can
//!   time out tasks individually.
//! - [`SharedPool`] reuses a fixed set of worker processes and bounds the
//!   batch as a whole.
//!
//! [`Executor`] picks one of them from an [`EngineConfig`].

use crate::accumulator::MaybeResult;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::task::TaskFunction;
use async_trait::async_trait;

pub mod per_task;
pub mod pool;
mod tally;

pub use per_task::ProcessPerTask;
pub use pool::SharedPool;

/// Runs a function over inputs in worker processes and reduces the results.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Map `function` over `inputs` and combine every outcome.
    ///
    /// Returns the accumulated value together with every recorded task
    /// failure. An empty input sequence yields the accumulator identity.
    async fn mapreduce<F, I>(&self, function: F, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        F: TaskFunction,
        I: IntoIterator<Item = F::Input> + Send,
        I::IntoIter: Send;
}

/// Either engine, selected at runtime
#[derive(Debug, Clone)]
pub enum Executor {
    PerTask(ProcessPerTask),
    SharedPool(SharedPool),
}

impl Executor {
    /// Validate `config` and build the matching engine
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        match config {
            EngineConfig::PerTask(config) => Ok(Self::PerTask(ProcessPerTask::new(config)?)),
            EngineConfig::SharedPool(config) => Ok(Self::SharedPool(SharedPool::new(config)?)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PerTask(_) => "per_task",
            Self::SharedPool(_) => "shared_pool",
        }
    }
}

impl TryFrom<EngineConfig> for Executor {
    type Error = EngineError;

    fn try_from(config: EngineConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}

#[async_trait]
impl Engine for Executor {
    async fn mapreduce<F, I>(&self, function: F, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        F: TaskFunction,
        I: IntoIterator<Item = F::Input> + Send,
        I::IntoIter: Send,
    {
        match self {
            Self::PerTask(engine) => engine.mapreduce(function, inputs).await,
            Self::SharedPool(engine) => engine.mapreduce(function, inputs).await,
        }
    }
}

/// Run `function` over `inputs` on `engine`
pub async fn mapreduce<E, F, I>(
    function: F,
    inputs: I,
    engine: &E,
) -> EngineResult<MaybeResult<F::Output>>
where
    E: Engine,
    F: TaskFunction,
    I: IntoIterator<Item = F::Input> + Send,
    I::IntoIter: Send,
{
    engine.mapreduce(function, inputs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessPerTaskConfig, SharedPoolConfig};
    use std::time::Duration;

    #[test]
    fn test_executor_from_config() {
        let per_task = ProcessPerTaskConfig::new(2, Duration::from_secs(1));
        let executor = Executor::from_config(per_task.into()).unwrap();
        assert_eq!(executor.name(), "per_task");

        let executor = Executor::try_from(EngineConfig::from(SharedPoolConfig::new(3))).unwrap();
        assert_eq!(executor.name(), "shared_pool");
    }

    #[test]
    fn test_executor_rejects_zero_parallelism() {
        let err = Executor::from_config(SharedPoolConfig::new(0).into()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidConfiguration { ref field, .. } if field == "parallelism"
        ));
    }
}
