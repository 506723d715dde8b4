//! Common test utilities and helpers
#![allow(dead_code)]

use procmap::config::{IsolationBackend, ProcessPerTaskConfig, SharedPoolConfig};
use procmap::{Failure, MaybeResult, Sum};
use std::time::Duration;

/// The compiled `procmap` binary, serving tasks
pub fn worker_backend() -> IsolationBackend {
    IsolationBackend::program(env!("CARGO_BIN_EXE_procmap"), &["worker"])
}

pub fn per_task_config(parallelism: usize, task_timeout: Duration) -> ProcessPerTaskConfig {
    ProcessPerTaskConfig::new(parallelism, task_timeout).with_backend(worker_backend())
}

pub fn pool_config(parallelism: usize) -> SharedPoolConfig {
    SharedPoolConfig::new(parallelism).with_backend(worker_backend())
}

pub fn origins(outcome: &MaybeResult<Sum<i64>>) -> Vec<&str> {
    outcome.failures.iter().map(|f| f.origin.as_str()).collect()
}

pub fn only_failure(outcome: &MaybeResult<Sum<i64>>) -> &Failure {
    assert_eq!(
        outcome.failures.len(),
        1,
        "expected exactly one failure, got {:?}",
        outcome.failures
    );
    &outcome.failures[0]
}
