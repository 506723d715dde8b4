//! Map-reduce with one worker process per task
//!
//! Every attempt of every task gets a fresh process, so nothing leaks between
//! tasks and each attempt can be timed out individually by killing its
//! process. The price is process start-up cost per task.
//!
//! The coordinator keeps at most `parallelism` tasks running. Workers report
//! through a channel whose messages are tagged with the task id; the
//! coordinator waits on it no longer than the earliest running deadline and
//! kills one overdue worker whenever that wait runs out.

use super::tally::{task_failure, Tally};
use super::Engine;
use crate::accumulator::MaybeResult;
use crate::config::ProcessPerTaskConfig;
use crate::error::{EngineError, EngineResult, TaskError};
use crate::task::TaskFunction;
use crate::worker::process::{drain, read_response, ResponseReader};
use crate::worker::protocol::{encode_value, TaskRequest};
use crate::worker::{ExitInfo, WorkerProcess};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How long a worker that already answered may take to exit
const REAP_GRACE: Duration = Duration::from_secs(3);

/// Engine that spawns a dedicated worker process for every task attempt
#[derive(Debug, Clone)]
pub struct ProcessPerTask {
    config: ProcessPerTaskConfig,
}

impl ProcessPerTask {
    pub fn new(config: ProcessPerTaskConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProcessPerTaskConfig {
        &self.config
    }
}

#[async_trait]
impl Engine for ProcessPerTask {
    async fn mapreduce<F, I>(&self, function: F, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        F: TaskFunction,
        I: IntoIterator<Item = F::Input> + Send,
        I::IntoIter: Send,
    {
        let span = info_span!(
            "mapreduce",
            engine = "per_task",
            batch = %Uuid::new_v4(),
            function = F::NAME
        );
        async move {
            let payload = encode_value("task function", &function)?;
            Coordinator::<F>::new(&self.config, payload)
                .run(inputs.into_iter())
                .await
        }
        .instrument(span)
        .await
    }
}

/// What a worker's reader task observed
#[derive(Debug)]
enum Delivery {
    Response(Result<Value, TaskError>),
    /// Stdout closed without a response
    Lost,
}

#[derive(Debug)]
struct Event {
    task_id: u64,
    delivery: Delivery,
}

/// An argument waiting for a (re)submission
struct Pending<I> {
    index: usize,
    argument: I,
    attempt: u32,
}

/// One in-flight attempt; a retry gets a new record
struct TaskRecord<I> {
    index: usize,
    argument: I,
    worker: WorkerProcess,
    submitted_at: Instant,
    attempt: u32,
}

struct Coordinator<'a, F: TaskFunction> {
    config: &'a ProcessPerTaskConfig,
    payload: Value,
    running: HashMap<u64, TaskRecord<F::Input>>,
    retries: VecDeque<Pending<F::Input>>,
    next_task_id: u64,
    tally: Tally<F::Output>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<'a, F: TaskFunction> Coordinator<'a, F> {
    fn new(config: &'a ProcessPerTaskConfig, payload: Value) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            payload,
            running: HashMap::new(),
            retries: VecDeque::new(),
            next_task_id: 0,
            tally: Tally::new(config.failure_order),
            events_tx,
            events_rx,
        }
    }

    async fn run<I>(mut self, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        I: Iterator<Item = F::Input>,
    {
        let mut inputs = inputs.enumerate().fuse();

        loop {
            if self.running.len() < self.config.parallelism {
                let next = self.retries.pop_front().or_else(|| {
                    inputs.next().map(|(index, argument)| Pending {
                        index,
                        argument,
                        attempt: 1,
                    })
                });
                if let Some(pending) = next {
                    self.admit(pending).await?;
                    continue;
                }
            }

            if self.running.is_empty() {
                debug!("All tasks completed");
                break;
            }

            let deadline = self.earliest_deadline()?;
            match tokio::time::timeout_at(deadline.into(), self.events_rx.recv()).await {
                Ok(Some(event)) => self.complete(event).await?,
                Ok(None) => return Err(EngineError::internal("task event channel closed")),
                Err(_) => {
                    debug!("Wait for a result timed out");
                    self.expire().await?;
                }
            }
        }

        info!(
            "Map-reduce finished: {} input(s), {} failure(s)",
            self.tally.settled(),
            self.tally.failure_count()
        );
        Ok(self.tally.finish())
    }

    async fn admit(&mut self, pending: Pending<F::Input>) -> EngineResult<()> {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let argument = encode_value("task argument", &pending.argument)?;
        let line = TaskRequest::new(task_id, F::NAME, self.payload.clone(), argument).to_line()?;

        let submitted_at = Instant::now();
        let mut worker = WorkerProcess::spawn(&self.config.isolation_backend)?;
        if let Err(e) = worker.send_line(&line).await {
            // The reader will see the worker go away and report it as lost
            warn!(task_id, "Failed to hand task to worker: {}", e);
        }
        worker.close_stdin();

        let stdout = worker
            .take_stdout()
            .ok_or_else(|| EngineError::internal("worker stdout was not captured"))?;
        tokio::spawn(forward_response(task_id, stdout, self.events_tx.clone()));

        debug!(
            task_id,
            pid = ?worker.pid(),
            attempt = pending.attempt,
            "Submitted input #{} as task {}",
            pending.index,
            task_id
        );
        self.running.insert(
            task_id,
            TaskRecord {
                index: pending.index,
                argument: pending.argument,
                worker,
                submitted_at,
                attempt: pending.attempt,
            },
        );
        Ok(())
    }

    fn earliest_deadline(&self) -> EngineResult<Instant> {
        self.running
            .values()
            .map(|record| record.submitted_at + self.config.task_timeout)
            .min()
            .ok_or_else(|| EngineError::internal("no running task to wait for"))
    }

    async fn complete(&mut self, event: Event) -> EngineResult<()> {
        let Some(mut record) = self.running.remove(&event.task_id) else {
            debug!(
                task_id = event.task_id,
                "Ignoring delivery for a task that is no longer running"
            );
            return Ok(());
        };

        let exit = reap(&mut record.worker, event.task_id).await?;
        debug!(task_id = event.task_id, %exit, "Result received");

        let (outcome, exit) = match event.delivery {
            Delivery::Response(Ok(value)) => (
                serde_json::from_value(value).map_err(|e| TaskError::decode("task output", e)),
                Some(exit),
            ),
            Delivery::Response(Err(cause)) => (Err(cause), Some(exit)),
            Delivery::Lost => (Err(TaskError::WorkerLost { exit }), None),
        };
        self.settle(event.task_id, record, outcome, exit);
        Ok(())
    }

    /// Kill the most overdue task, if any deadline has passed
    async fn expire(&mut self) -> EngineResult<()> {
        // A result may have landed while the wait was timing out
        if let Ok(event) = self.events_rx.try_recv() {
            return self.complete(event).await;
        }

        let now = Instant::now();
        let overdue = self
            .running
            .iter()
            .map(|(task_id, record)| (*task_id, record.submitted_at + self.config.task_timeout))
            .filter(|(_, deadline)| *deadline <= now)
            .min_by_key(|(_, deadline)| *deadline)
            .map(|(task_id, _)| task_id);
        let Some(task_id) = overdue else {
            return Ok(());
        };
        let Some(mut record) = self.running.remove(&task_id) else {
            return Err(EngineError::internal(format!(
                "overdue task {} vanished from the running set",
                task_id
            )));
        };

        warn!(
            task_id,
            pid = ?record.worker.pid(),
            "Killing task with arg {:?} after {:?}",
            record.argument,
            self.config.task_timeout
        );
        record.worker.kill();
        reap(&mut record.worker, task_id).await?;

        let cause = TaskError::TimedOut {
            timeout: self.config.task_timeout,
        };
        self.settle(task_id, record, Err(cause), None);
        Ok(())
    }

    /// Record the outcome of an attempt, or queue another attempt
    fn settle(
        &mut self,
        task_id: u64,
        record: TaskRecord<F::Input>,
        outcome: Result<F::Output, TaskError>,
        exit: Option<ExitInfo>,
    ) {
        let retries = self.config.task_retries;
        let mut failures = Vec::new();
        let result = match outcome {
            Ok(value) => Some(value),
            Err(cause) => {
                failures.push(task_failure(&record.argument, cause, record.attempt, retries));
                None
            }
        };
        if let Some(exit) = exit.filter(|exit| !exit.success()) {
            warn!(task_id, %exit, "Worker exited with a failure status");
            let cause = TaskError::NonZeroExit { exit };
            failures.push(task_failure(&record.argument, cause, record.attempt, retries));
        }

        if result.is_none() && record.attempt <= retries {
            for failure in &failures {
                warn!(task_id, "{}: {}; retrying", failure.origin, failure.cause);
            }
            self.retries.push_back(Pending {
                index: record.index,
                argument: record.argument,
                attempt: record.attempt + 1,
            });
            return;
        }

        self.tally
            .absorb(record.index, MaybeResult::new(result, failures));
    }
}

async fn reap(worker: &mut WorkerProcess, task_id: u64) -> EngineResult<ExitInfo> {
    match worker.reap(REAP_GRACE).await {
        Ok(Some(exit)) => Ok(exit),
        Ok(None) => {
            warn!(
                task_id,
                pid = ?worker.pid(),
                program = worker.program(),
                "Worker did not exit within {:?} of answering",
                REAP_GRACE
            );
            Err(EngineError::ReapFailed {
                task_id,
                pid: worker.pid(),
                grace: REAP_GRACE,
            })
        }
        Err(source) => Err(EngineError::Pipe {
            task_id,
            operation: "reaping the worker",
            source,
        }),
    }
}

/// Reader task: deliver the worker's answer, then drain its remaining output
async fn forward_response(
    task_id: u64,
    mut stdout: ResponseReader,
    events: mpsc::UnboundedSender<Event>,
) {
    let delivery = match read_response(&mut stdout, task_id).await {
        Ok(Some(response)) => Delivery::Response(response.outcome),
        Ok(None) => Delivery::Lost,
        Err(e) => {
            debug!(task_id, "Reading worker output failed: {}", e);
            Delivery::Lost
        }
    };
    if events.send(Event { task_id, delivery }).is_err() {
        return;
    }
    drain(&mut stdout).await;
}
