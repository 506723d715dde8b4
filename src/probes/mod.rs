//! Built-in task functions
//!
//! Small functions over `i64` inputs whose failure modes can be triggered on
//! demand. The `procmap` binary registers all of them, which makes it usable
//! both for smoke-testing an installation and as the worker program of the
//! integration tests.

use crate::monoid::Sum;
use crate::task::TaskFunction;
use crate::worker::{exit_after_serving, Registry};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

/// Every probe, keyed by name
pub fn registry() -> Registry {
    Registry::new()
        .with::<Double>()
        .with::<FailAbove>()
        .with::<SleepAbove>()
        .with::<ExitAfterDelivery>()
        .with::<CrashAt>()
        .with::<PanicAt>()
        .with::<Flaky>()
}

/// `x -> 2x`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Double;

impl TaskFunction for Double {
    const NAME: &'static str = "double";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        Ok(Sum(input * 2))
    }
}

/// Doubles, but refuses inputs above `limit`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailAbove {
    pub limit: i64,
}

impl TaskFunction for FailAbove {
    const NAME: &'static str = "fail_above";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        if input > self.limit {
            bail!("thou shalt not pass more than {}", self.limit);
        }
        Ok(Sum(input * 2))
    }
}

/// Doubles, after sleeping `millis` for inputs above `limit`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SleepAbove {
    pub limit: i64,
    pub millis: u64,
}

impl TaskFunction for SleepAbove {
    const NAME: &'static str = "sleep_above";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        if input > self.limit {
            std::thread::sleep(Duration::from_millis(self.millis));
        }
        Ok(Sum(input * 2))
    }
}

/// Doubles; on input `at` the worker then exits with status `code`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitAfterDelivery {
    pub at: i64,
    pub code: i32,
}

impl TaskFunction for ExitAfterDelivery {
    const NAME: &'static str = "exit_after_delivery";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        if input == self.at {
            exit_after_serving(self.code);
        }
        Ok(Sum(input * 2))
    }
}

/// Doubles; on input `at` the worker dies before answering
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrashAt {
    pub at: i64,
}

/// Exit status of a worker killed by [`CrashAt`]
pub const CRASH_EXIT_CODE: i32 = 7;

impl TaskFunction for CrashAt {
    const NAME: &'static str = "crash_at";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        if input == self.at {
            std::process::exit(CRASH_EXIT_CODE);
        }
        Ok(Sum(input * 2))
    }
}

/// Doubles; panics on input `at`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PanicAt {
    pub at: i64,
}

impl TaskFunction for PanicAt {
    const NAME: &'static str = "panic_at";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        if input == self.at {
            panic!("probe panicked on {}", input);
        }
        Ok(Sum(input * 2))
    }
}

/// Fails the first `failures` calls for each input, then doubles.
///
/// Calls are counted with marker files in `ledger`, so the count survives
/// across worker processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flaky {
    pub failures: u32,
    pub ledger: PathBuf,
}

impl Flaky {
    /// Claim the next call number for `input`
    fn record_call(&self, input: i64) -> Result<u32> {
        let mut call = 1;
        loop {
            let marker = self.ledger.join(format!("{}.{}", input, call));
            match OpenOptions::new().write(true).create_new(true).open(&marker) {
                Ok(_) => return Ok(call),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => call += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to record call in {}", marker.display())
                    })
                }
            }
        }
    }
}

impl TaskFunction for Flaky {
    const NAME: &'static str = "flaky";
    type Input = i64;
    type Output = Sum<i64>;

    fn call(&self, input: i64) -> Result<Sum<i64>> {
        let call = self.record_call(input)?;
        if call <= self.failures {
            bail!("transient failure {} of {} for {}", call, self.failures, input);
        }
        Ok(Sum(input * 2))
    }
}
