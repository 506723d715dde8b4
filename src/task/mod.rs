//! The callee contract
//!
//! A task function is a serializable *value*: its fields travel to the worker
//! with every request, so parameters such as limits or paths need no global
//! state. The worker finds the matching implementation by [`TaskFunction::NAME`]
//! in its [`crate::worker::Registry`].

use crate::monoid::Monoid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A single-argument function that can be executed in a worker process.
///
/// # Example
///
/// ```
/// use procmap::monoid::Sum;
/// use procmap::task::TaskFunction;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Square;
///
/// impl TaskFunction for Square {
///     const NAME: &'static str = "square";
///     type Input = i64;
///     type Output = Sum<i64>;
///
///     fn call(&self, input: i64) -> anyhow::Result<Sum<i64>> {
///         Ok(Sum(input * input))
///     }
/// }
/// ```
pub trait TaskFunction: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name under which the worker registry knows this function
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static;
    type Output: Monoid + Serialize + DeserializeOwned + Send + 'static;

    fn call(&self, input: Self::Input) -> anyhow::Result<Self::Output>;
}
