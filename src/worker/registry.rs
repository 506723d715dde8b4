//! Name-to-function registry used inside worker processes

use super::protocol::TaskRequest;
use crate::error::TaskError;
use crate::task::TaskFunction;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type Handler = Box<dyn Fn(Value, Value) -> Result<Value, TaskError> + Send + Sync>;

/// Task functions a worker binary knows how to run
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<&'static str, Handler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `F` under [`TaskFunction::NAME`], replacing any previous entry
    pub fn register<F: TaskFunction>(&mut self) -> &mut Self {
        if self.handlers.insert(F::NAME, Box::new(invoke::<F>)).is_some() {
            tracing::debug!("Replaced task function registered as {}", F::NAME);
        }
        self
    }

    /// Builder-style [`Registry::register`]
    pub fn with<F: TaskFunction>(mut self) -> Self {
        self.register::<F>();
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the function named in `request` on its argument.
    ///
    /// Errors and panics raised by the function are captured as [`TaskError`]s.
    pub fn dispatch(&self, request: TaskRequest) -> Result<Value, TaskError> {
        let handler =
            self.handlers
                .get(request.function.as_str())
                .ok_or_else(|| TaskError::UnknownFunction {
                    name: request.function.clone(),
                })?;
        handler(request.payload, request.argument)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.names())
            .finish()
    }
}

fn invoke<F: TaskFunction>(payload: Value, argument: Value) -> Result<Value, TaskError> {
    let function: F = serde_json::from_value(payload)
        .map_err(|e| TaskError::decode(format!("payload of `{}`", F::NAME), e))?;
    let input: F::Input =
        serde_json::from_value(argument).map_err(|e| TaskError::decode("argument", e))?;

    let output = match panic::catch_unwind(AssertUnwindSafe(|| function.call(input))) {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(TaskError::callee(&err)),
        Err(payload) => {
            return Err(TaskError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        }
    };

    serde_json::to_value(&output).map_err(|e| TaskError::decode("output", e))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monoid::Sum;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Scale {
        factor: i64,
    }

    impl TaskFunction for Scale {
        const NAME: &'static str = "scale";
        type Input = i64;
        type Output = Sum<i64>;

        fn call(&self, input: i64) -> anyhow::Result<Sum<i64>> {
            if input < 0 {
                anyhow::bail!("negative input {}", input);
            }
            if input == 13 {
                panic!("unlucky");
            }
            Ok(Sum(input * self.factor))
        }
    }

    fn request(argument: Value) -> TaskRequest {
        TaskRequest::new(1, Scale::NAME, json!({"factor": 3}), argument)
    }

    #[test]
    fn test_dispatch_success() {
        let registry = Registry::new().with::<Scale>();
        assert_eq!(registry.dispatch(request(json!(5))), Ok(json!(15)));
    }

    #[test]
    fn test_dispatch_callee_error() {
        let registry = Registry::new().with::<Scale>();
        assert_eq!(
            registry.dispatch(request(json!(-1))),
            Err(TaskError::Callee {
                message: "negative input -1".to_string()
            })
        );
    }

    #[test]
    fn test_dispatch_captures_panic() {
        let registry = Registry::new().with::<Scale>();
        assert_eq!(
            registry.dispatch(request(json!(13))),
            Err(TaskError::Panicked {
                message: "unlucky".to_string()
            })
        );
    }

    #[test]
    fn test_dispatch_bad_argument() {
        let registry = Registry::new().with::<Scale>();
        let err = registry.dispatch(request(json!("five"))).unwrap_err();
        assert!(matches!(err, TaskError::Decode { ref what, .. } if what == "argument"));
    }

    #[test]
    fn test_dispatch_unknown_function() {
        let registry = Registry::new();
        let err = registry.dispatch(request(json!(1))).unwrap_err();
        assert_eq!(
            err,
            TaskError::UnknownFunction {
                name: "scale".to_string()
            }
        );
        assert!(registry.names().is_empty());
    }
}
