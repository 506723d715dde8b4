//! CLI argument structures
//!
//! This module defines the command-line interface of the `procmap` binary.

use crate::config::FailureOrder;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Map-reduce a built-in task function over integers in isolated processes
#[derive(Debug, Parser)]
#[command(name = "procmap")]
#[command(about = "procmap - parallel map-reduce over OS processes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a map-reduce and print the accumulated result as JSON
    #[command(name = "run")]
    Run(RunArgs),

    /// Serve task requests over stdin/stdout
    #[command(name = "worker")]
    Worker,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Registered name of the task function (see `crate::probes`)
    #[arg(short, long)]
    pub function: String,

    /// JSON value of the task function's parameters
    #[arg(long, default_value = "null")]
    pub payload: String,

    /// Engine configuration file (.toml, .yaml or .yml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Scheduling engine; ignored when a configuration file is given
    #[arg(short, long, value_enum, default_value_t = EngineKind::PerTask)]
    pub engine: EngineKind,

    /// Maximum number of concurrent worker processes
    #[arg(short = 'j', long)]
    pub parallelism: Option<usize>,

    /// Per-task timeout of the per-task engine (e.g. "30s", "500ms")
    #[arg(long, value_parser = parse_duration)]
    pub task_timeout: Option<Duration>,

    /// Extra attempts for failing tasks
    #[arg(long)]
    pub retries: Option<u32>,

    /// Deadline for the whole batch on the shared-pool engine
    #[arg(long, value_parser = parse_duration)]
    pub total_timeout: Option<Duration>,

    /// Replace a pool worker after it has served this many tasks
    #[arg(long, value_name = "N")]
    pub recycle_after: Option<usize>,

    /// Order of the reported failures
    #[arg(long, value_enum)]
    pub failure_order: Option<FailureOrderArg>,

    /// Integer inputs to map over
    #[arg(allow_negative_numbers = true)]
    pub inputs: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// A fresh worker process per task
    PerTask,
    /// A fixed pool of reused worker processes
    SharedPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailureOrderArg {
    Input,
    Completion,
}

impl From<FailureOrderArg> for FailureOrder {
    fn from(arg: FailureOrderArg) -> Self {
        match arg {
            FailureOrderArg::Input => FailureOrder::Input,
            FailureOrderArg::Completion => FailureOrder::Completion,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "procmap",
            "-vv",
            "run",
            "--function",
            "fail_above",
            "--payload",
            r#"{"limit": 9}"#,
            "--engine",
            "shared-pool",
            "-j",
            "3",
            "--total-timeout",
            "1m",
            "1",
            "-2",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.function, "fail_above");
        assert_eq!(args.engine, EngineKind::SharedPool);
        assert_eq!(args.parallelism, Some(3));
        assert_eq!(args.total_timeout, Some(Duration::from_secs(60)));
        assert_eq!(args.inputs, vec![1, -2, 10]);
    }

    #[test]
    fn test_parse_worker_command() {
        let cli = Cli::try_parse_from(["procmap", "worker"]).unwrap();
        assert!(matches!(cli.command, Commands::Worker));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let result = Cli::try_parse_from([
            "procmap",
            "run",
            "--function",
            "double",
            "--task-timeout",
            "soon",
        ]);
        assert!(result.is_err());
    }
}
