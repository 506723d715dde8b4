//! The `run` command
//!
//! Builds an engine from a configuration file or from flags, map-reduces one
//! of the built-in probes over the given integers and prints the accumulator.

use crate::cli::args::{EngineKind, RunArgs};
use crate::config::{load_engine_config, EngineConfig, ProcessPerTaskConfig, SharedPoolConfig};
use crate::engine::{Engine, Executor};
use crate::probes::{self, CrashAt, Double, ExitAfterDelivery, FailAbove, Flaky, PanicAt, SleepAbove};
use crate::task::TaskFunction;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::debug;

/// Exit status of a run that recorded task failures
pub const EXIT_WITH_FAILURES: i32 = 3;

const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Execute `run`, returning the process exit status
pub async fn run_command(args: RunArgs) -> Result<i32> {
    let config = engine_config(&args).await?;
    debug!(?config, "Resolved engine configuration");
    let executor = Executor::from_config(config)?;

    match args.function.as_str() {
        Double::NAME => run_probe::<Double>(&executor, &args).await,
        FailAbove::NAME => run_probe::<FailAbove>(&executor, &args).await,
        SleepAbove::NAME => run_probe::<SleepAbove>(&executor, &args).await,
        ExitAfterDelivery::NAME => run_probe::<ExitAfterDelivery>(&executor, &args).await,
        CrashAt::NAME => run_probe::<CrashAt>(&executor, &args).await,
        PanicAt::NAME => run_probe::<PanicAt>(&executor, &args).await,
        Flaky::NAME => run_probe::<Flaky>(&executor, &args).await,
        other => bail!(
            "Unknown function `{}`; available: {}",
            other,
            probes::registry().names().join(", ")
        ),
    }
}

async fn run_probe<F>(executor: &Executor, args: &RunArgs) -> Result<i32>
where
    F: TaskFunction<Input = i64>,
{
    let function: F = serde_json::from_str(&args.payload)
        .with_context(|| format!("Invalid payload for `{}`: {}", F::NAME, args.payload))?;

    let outcome = executor.mapreduce(function, args.inputs.clone()).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(if outcome.is_clean() {
        0
    } else {
        EXIT_WITH_FAILURES
    })
}

/// Load the configuration file if one was given, then apply flag overrides
pub async fn engine_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => load_engine_config(path).await?,
        None => default_config(args.engine),
    };

    match &mut config {
        EngineConfig::PerTask(per_task) => {
            if let Some(parallelism) = args.parallelism {
                per_task.parallelism = parallelism;
            }
            if let Some(timeout) = args.task_timeout {
                per_task.task_timeout = timeout;
            }
            if let Some(retries) = args.retries {
                per_task.task_retries = retries;
            }
            if let Some(order) = args.failure_order {
                per_task.failure_order = order.into();
            }
        }
        EngineConfig::SharedPool(pool) => {
            if let Some(parallelism) = args.parallelism {
                pool.parallelism = parallelism;
            }
            if let Some(limit) = args.recycle_after {
                pool.worker_recycle_limit = Some(limit);
            }
            if let Some(retries) = args.retries {
                pool.task_retries = retries;
            }
            if let Some(timeout) = args.total_timeout {
                pool.total_timeout = Some(timeout);
            }
            if let Some(order) = args.failure_order {
                pool.failure_order = order.into();
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn default_config(kind: EngineKind) -> EngineConfig {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match kind {
        EngineKind::PerTask => ProcessPerTaskConfig::new(parallelism, DEFAULT_TASK_TIMEOUT).into(),
        EngineKind::SharedPool => SharedPoolConfig::new(parallelism).into(),
    }
}
