//! Wire protocol between coordinator and worker processes
//!
//! Newline-delimited JSON over the worker's stdio: one [`TaskRequest`] per
//! stdin line, one [`TaskResponse`] per stdout line. Every message carries the
//! coordinator-assigned `task_id` so results can be matched back to their
//! task records regardless of arrival order.

use crate::error::{EngineError, EngineResult, TaskError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable marking a process as a procmap worker
pub const WORKER_ENV: &str = "PROCMAP_WORKER";

/// A unit of work handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: u64,
    /// Registered name of the task function
    pub function: String,
    /// The serialized task function value
    pub payload: Value,
    pub argument: Value,
}

/// A worker's answer to one [`TaskRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: u64,
    pub outcome: Result<Value, TaskError>,
    /// Status the worker will exit with once its input closes, if the task
    /// asked for one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_requested: Option<i32>,
}

impl TaskRequest {
    pub fn new(task_id: u64, function: &str, payload: Value, argument: Value) -> Self {
        Self {
            task_id,
            function: function.to_string(),
            payload,
            argument,
        }
    }

    /// Render as a single protocol line, newline included
    pub fn to_line(&self) -> EngineResult<String> {
        to_line(self).map_err(|source| EngineError::Encode {
            what: "task request",
            source,
        })
    }
}

impl TaskResponse {
    pub fn to_line(&self) -> serde_json::Result<String> {
        to_line(self)
    }

    /// Parse a stdout line; anything that is not a response yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

fn to_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Serialize any value into the protocol's JSON representation
pub fn encode_value<T: Serialize>(what: &'static str, value: &T) -> EngineResult<Value> {
    serde_json::to_value(value).map_err(|source| EngineError::Encode { what, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_line_is_single_json_line() {
        let request = TaskRequest::new(4, "double", json!(null), json!(21));
        let line = request.to_line().unwrap();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let parsed: TaskRequest = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_parse_skips_stray_output() {
        assert!(TaskResponse::parse("hello from a chatty task").is_none());
        assert!(TaskResponse::parse("{\"unrelated\": true}").is_none());
        assert!(TaskResponse::parse("").is_none());
    }

    #[test]
    fn test_parse_error_outcome() {
        let line = r#"{"task_id":9,"outcome":{"Err":{"kind":"callee","message":"nope"}}}"#;
        let response = TaskResponse::parse(line).unwrap();

        assert_eq!(response.task_id, 9);
        assert_eq!(
            response.outcome,
            Err(TaskError::Callee {
                message: "nope".to_string()
            })
        );
        assert_eq!(response.exit_requested, None);
    }

    #[test]
    fn test_exit_request_only_serialized_when_set() {
        let mut response = TaskResponse {
            task_id: 2,
            outcome: Ok(json!(4)),
            exit_requested: None,
        };
        assert_eq!(
            response.to_line().unwrap(),
            "{\"task_id\":2,\"outcome\":{\"Ok\":4}}\n"
        );

        response.exit_requested = Some(3);
        let parsed = TaskResponse::parse(&response.to_line().unwrap()).unwrap();
        assert_eq!(parsed.exit_requested, Some(3));
    }
}
