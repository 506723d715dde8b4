//! Result accumulation
//!
//! [`MaybeResult`] pairs an optional combined value with the ordered list of
//! [`Failure`]s collected along the way. It is *not* an either type: both sides
//! may be filled at once, which is how a task can contribute a value and still
//! report that its worker crashed on the way out.
//!
//! Because `MaybeResult<R>` is itself a [`Monoid`] whenever `R` is, running N
//! independent computations and keeping partial progress on partial failure is
//! just `msum` over their outcomes.

use crate::error::TaskError;
use crate::monoid::Monoid;
use serde::{Deserialize, Serialize};

/// A recovered task failure; `origin` is free-text context such as the argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub origin: String,
    pub cause: TaskError,
}

impl Failure {
    pub fn new(origin: impl Into<String>, cause: TaskError) -> Self {
        Self {
            origin: origin.into(),
            cause,
        }
    }

    /// Prefix the origin with the attempt counter of a retried task
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.origin = format!("attempt {}: {}", attempt, self.origin);
        self
    }
}

/// Failures compare by origin and rendered cause only.
impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.cause.to_string() == other.cause.to_string()
    }
}

impl Eq for Failure {}

/// Optional result plus every failure seen while producing it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaybeResult<R> {
    pub result: Option<R>,
    pub failures: Vec<Failure>,
}

impl<R> MaybeResult<R> {
    pub fn new(result: Option<R>, failures: Vec<Failure>) -> Self {
        Self { result, failures }
    }

    /// The accumulator identity: no result, no failures
    pub fn empty() -> Self {
        Self {
            result: None,
            failures: Vec::new(),
        }
    }

    pub fn success(value: R) -> Self {
        Self {
            result: Some(value),
            failures: Vec::new(),
        }
    }

    pub fn failure(failure: Failure) -> Self {
        Self {
            result: None,
            failures: vec![failure],
        }
    }

    /// True when no failure has been recorded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> MaybeResult<S> {
        MaybeResult {
            result: self.result.map(f),
            failures: self.failures,
        }
    }

    /// Strict view: the value when nothing failed, otherwise the failures.
    pub fn into_result(self) -> Result<Option<R>, Vec<Failure>> {
        if self.failures.is_empty() {
            Ok(self.result)
        } else {
            Err(self.failures)
        }
    }
}

impl<R> Default for MaybeResult<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Monoid> Monoid for MaybeResult<R> {
    fn identity() -> Self {
        Self::empty()
    }

    fn combine(self, other: Self) -> Self {
        let result = match (self.result, other.result) {
            (None, None) => None,
            (Some(value), None) | (None, Some(value)) => Some(value),
            (Some(left), Some(right)) => Some(left.combine(right)),
        };
        let mut failures = self.failures;
        failures.extend(other.failures);
        Self { result, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monoid::{msum, Sum};

    fn callee_failure(origin: &str) -> Failure {
        Failure::new(
            origin,
            TaskError::Callee {
                message: "boom".to_string(),
            },
        )
    }

    #[test]
    fn test_msum_keeps_results_and_failures_in_order() {
        let succ1 = MaybeResult::success(Sum(4));
        let fail1 = MaybeResult::new(Some(Sum::identity()), vec![callee_failure("a")]);
        let succ2 = MaybeResult::success(Sum(5));
        let fail2 = MaybeResult::new(Some(Sum::identity()), vec![callee_failure("b")]);

        let all = msum(vec![succ1, fail1, succ2, fail2]);

        assert_eq!(all.result, Some(Sum(9)));
        assert_eq!(all.failures, vec![callee_failure("a"), callee_failure("b")]);
    }

    #[test]
    fn test_empty_msum_is_identity() {
        let all: MaybeResult<Sum<i64>> = msum(Vec::new());
        assert_eq!(all, MaybeResult::empty());
        assert!(all.is_clean());
    }

    #[test]
    fn test_single_present_result_passes_through() {
        let only_failure: MaybeResult<Vec<u8>> = MaybeResult::failure(callee_failure("x"));
        let combined = only_failure.combine(MaybeResult::success(vec![1, 2]));
        assert_eq!(combined.result, Some(vec![1, 2]));
        assert_eq!(combined.failures.len(), 1);
    }

    #[test]
    fn test_failure_equality_ignores_cause_variant() {
        let callee = Failure::new(
            "arg 1",
            TaskError::Callee {
                message: "failed to decode argument: eof".to_string(),
            },
        );
        let decode = Failure::new("arg 1", TaskError::decode("argument", "eof"));
        assert_eq!(callee, decode);
        assert_ne!(callee, Failure::new("arg 2", TaskError::decode("argument", "eof")));
    }

    #[test]
    fn test_with_attempt_prefixes_origin() {
        let failure = callee_failure("failure with args 10").with_attempt(2);
        assert_eq!(failure.origin, "attempt 2: failure with args 10");
    }

    #[test]
    fn test_into_result() {
        assert_eq!(MaybeResult::success(Sum(1)).into_result(), Ok(Some(Sum(1))));
        let failed: MaybeResult<Sum<i32>> = MaybeResult::failure(callee_failure("z"));
        assert_eq!(failed.into_result().unwrap_err().len(), 1);
    }
}
