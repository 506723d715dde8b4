//! Worker-side serve loop
//!
//! A worker binary answers requests until its stdin closes. The per-task
//! engine sends exactly one request and closes stdin right away; the shared
//! pool keeps the pipe open and feeds requests one after another.
//!
//! Task functions must not write partial lines to stdout: stray complete lines
//! are skipped by the coordinator, but text without a trailing newline would
//! be glued to the next response.

use super::protocol::{TaskRequest, TaskResponse, WORKER_ENV};
use super::registry::Registry;
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::debug;

static EXIT_AFTER_SERVING: AtomicI32 = AtomicI32::new(0);

/// True when this process was started by an engine as a worker
pub fn is_worker_process() -> bool {
    std::env::var_os(WORKER_ENV).is_some_and(|value| value == "1")
}

/// Ask the worker to exit with `code` once it stops serving.
///
/// Lets a task deliver its value and still end its process with a failure
/// status, which the engine reports as a non-zero exit. A `code` of zero
/// clears the request.
pub fn exit_after_serving(code: i32) {
    EXIT_AFTER_SERVING.store(code, Ordering::SeqCst);
}

fn requested_exit_code() -> Option<i32> {
    match EXIT_AFTER_SERVING.load(Ordering::SeqCst) {
        0 => None,
        code => Some(code),
    }
}

/// Answer every request read from `input`, returning how many were served
pub fn serve<R, W>(registry: &Registry, input: R, mut output: W) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut served = 0;
    for line in input.lines() {
        let line = line.context("Failed to read task request")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: TaskRequest =
            serde_json::from_str(&line).context("Received a malformed task request")?;
        let task_id = request.task_id;
        debug!(task_id, function = %request.function, "Running task");

        let response = TaskResponse {
            task_id,
            outcome: registry.dispatch(request),
            exit_requested: requested_exit_code(),
        };
        output
            .write_all(response.to_line()?.as_bytes())
            .and_then(|_| output.flush())
            .with_context(|| format!("Failed to deliver result of task {}", task_id))?;
        served += 1;
    }
    Ok(served)
}

/// Serve over the process's stdin/stdout, honouring [`exit_after_serving`]
pub fn serve_stdio(registry: &Registry) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let served = serve(registry, stdin.lock(), stdout.lock())?;
    debug!(served, pid = std::process::id(), "Worker input closed");

    if let Some(code) = requested_exit_code() {
        debug!(code, "Exiting with requested status");
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monoid::Sum;
    use crate::task::TaskFunction;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::io::Cursor;

    #[derive(Serialize, Deserialize)]
    struct Negate;

    impl TaskFunction for Negate {
        const NAME: &'static str = "negate";
        type Input = i64;
        type Output = Sum<i64>;

        fn call(&self, input: i64) -> anyhow::Result<Sum<i64>> {
            Ok(Sum(-input))
        }
    }

    fn request_line(task_id: u64, argument: i64) -> String {
        TaskRequest::new(task_id, Negate::NAME, json!(null), json!(argument))
            .to_line()
            .unwrap()
    }

    #[test]
    fn test_serve_answers_each_request_in_order() {
        let registry = Registry::new().with::<Negate>();
        let input = format!("{}\n{}", request_line(1, 4), request_line(2, -7));
        let mut output = Vec::new();

        let served = serve(&registry, Cursor::new(input), &mut output).unwrap();

        assert_eq!(served, 2);
        let responses: Vec<TaskResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .filter_map(TaskResponse::parse)
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].task_id, 1);
        assert_eq!(responses[0].outcome, Ok(json!(-4)));
        assert_eq!(responses[1].task_id, 2);
        assert_eq!(responses[1].outcome, Ok(json!(7)));
    }

    #[test]
    fn test_serve_rejects_malformed_request() {
        let registry = Registry::new().with::<Negate>();
        let result = serve(&registry, Cursor::new("not json\n"), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_serve_empty_input() {
        let registry = Registry::new();
        assert_eq!(serve(&registry, Cursor::new(""), Vec::new()).unwrap(), 0);
    }
}
