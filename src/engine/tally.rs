//! Coordinator-side bookkeeping shared by both engines

use crate::accumulator::{Failure, MaybeResult};
use crate::config::FailureOrder;
use crate::error::TaskError;
use crate::monoid::Monoid;
use std::fmt::Debug;

/// Running accumulator that remembers which input each failure came from
#[derive(Debug)]
pub(crate) struct Tally<R> {
    acc: MaybeResult<R>,
    failure_inputs: Vec<usize>,
    order: FailureOrder,
    settled: usize,
}

impl<R: Monoid> Tally<R> {
    pub(crate) fn new(order: FailureOrder) -> Self {
        Self {
            acc: MaybeResult::empty(),
            failure_inputs: Vec::new(),
            order,
            settled: 0,
        }
    }

    /// Fold the final outcome of the input at position `index`
    pub(crate) fn absorb(&mut self, index: usize, outcome: MaybeResult<R>) {
        self.failure_inputs
            .extend(std::iter::repeat(index).take(outcome.failures.len()));
        self.acc = std::mem::take(&mut self.acc).combine(outcome);
        self.settled += 1;
    }

    pub(crate) fn settled(&self) -> usize {
        self.settled
    }

    pub(crate) fn failure_count(&self) -> usize {
        self.acc.failures.len()
    }

    pub(crate) fn finish(self) -> MaybeResult<R> {
        let MaybeResult { result, failures } = self.acc;
        let failures = match self.order {
            FailureOrder::Completion => failures,
            FailureOrder::Input => {
                let mut indexed: Vec<(usize, Failure)> =
                    self.failure_inputs.into_iter().zip(failures).collect();
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, failure)| failure).collect()
            }
        };
        MaybeResult::new(result, failures)
    }
}

/// Build the failure record for one attempt of a task.
///
/// Origins name the argument; when retries are configured they also carry
/// the attempt number.
pub(crate) fn task_failure<I: Debug>(
    argument: &I,
    cause: TaskError,
    attempt: u32,
    task_retries: u32,
) -> Failure {
    let origin = match &cause {
        TaskError::NonZeroExit { exit } => {
            format!("non-zero exit code {} with arg {:?}", exit.reported_code(), argument)
        }
        TaskError::TimedOut { .. } => format!("timed out with arg {:?}", argument),
        TaskError::WorkerLost { .. } => format!("worker lost with arg {:?}", argument),
        TaskError::Callee { .. }
        | TaskError::Panicked { .. }
        | TaskError::Decode { .. }
        | TaskError::UnknownFunction { .. } => format!("failure with args {:?}", argument),
    };
    let failure = Failure::new(origin, cause);
    if task_retries > 0 {
        failure.with_attempt(attempt)
    } else {
        failure
    }
}
