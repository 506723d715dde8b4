//! Map-reduce over a fixed pool of reusable worker processes
//!
//! All inputs are queued up front. Each pool slot owns at most one worker
//! process and feeds it queued tasks one at a time, replacing it after
//! `worker_recycle_limit` tasks, when it dies, or when a task asks it to exit
//! with a status. A failing status is reported next to that task's value.
//! Workers are reused, so start-up cost is paid once per worker rather than
//! once per task, at the risk of state leaking between tasks served by the
//! same process.
//!
//! There is no per-task timeout here; `total_timeout` bounds the whole batch
//! and running out of it is fatal.

use super::tally::{task_failure, Tally};
use super::Engine;
use crate::accumulator::MaybeResult;
use crate::config::{IsolationBackend, SharedPoolConfig};
use crate::error::{EngineError, EngineResult, TaskError};
use crate::task::TaskFunction;
use crate::worker::protocol::{encode_value, TaskRequest, TaskResponse};
use crate::worker::{ExitInfo, WorkerProcess};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How long a retiring or crashed worker may take to exit
const REAP_GRACE: Duration = Duration::from_secs(3);

/// Engine backed by a pool of long-lived worker processes
#[derive(Debug, Clone)]
pub struct SharedPool {
    config: SharedPoolConfig,
}

impl SharedPool {
    pub fn new(config: SharedPoolConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SharedPoolConfig {
        &self.config
    }
}

#[async_trait]
impl Engine for SharedPool {
    async fn mapreduce<F, I>(&self, function: F, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        F: TaskFunction,
        I: IntoIterator<Item = F::Input> + Send,
        I::IntoIter: Send,
    {
        let span = info_span!(
            "mapreduce",
            engine = "shared_pool",
            batch = %Uuid::new_v4(),
            function = F::NAME
        );
        async move {
            let payload = encode_value("task function", &function)?;
            PoolCoordinator::<F>::start(&self.config, payload)
                .run(inputs.into_iter())
                .await
        }
        .instrument(span)
        .await
    }
}

/// A queued request, as seen by the pool slots
#[derive(Debug)]
struct Unit {
    task_id: u64,
    line: String,
}

#[derive(Debug)]
enum PoolEvent {
    Finished {
        task_id: u64,
        outcome: Result<Value, TaskError>,
        /// Status of a worker that was retired right after this task
        exit: Option<ExitInfo>,
    },
    Fatal(EngineError),
}

/// Coordinator-side record of a submitted unit; a retry gets a new one
struct UnitRecord<I> {
    index: usize,
    argument: I,
    attempt: u32,
}

struct PoolCoordinator<'a, F: TaskFunction> {
    config: &'a SharedPoolConfig,
    payload: Value,
    started_at: Instant,
    pending: HashMap<u64, UnitRecord<F::Input>>,
    next_task_id: u64,
    tally: Tally<F::Output>,
    queue: mpsc::UnboundedSender<Unit>,
    events: mpsc::UnboundedReceiver<PoolEvent>,
    slots: JoinSet<()>,
}

impl<'a, F: TaskFunction> PoolCoordinator<'a, F> {
    /// Start the pool slots; workers are spawned lazily by the slots
    fn start(config: &'a SharedPoolConfig, payload: Value) -> Self {
        let (queue, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (events_tx, events) = mpsc::unbounded_channel();

        let mut slots = JoinSet::new();
        for slot in 0..config.parallelism {
            slots.spawn(
                PoolSlot {
                    slot,
                    backend: config.isolation_backend.clone(),
                    recycle_limit: config.worker_recycle_limit,
                    queue: Arc::clone(&queue_rx),
                    events: events_tx.clone(),
                }
                .run(),
            );
        }

        Self {
            config,
            payload,
            started_at: Instant::now(),
            pending: HashMap::new(),
            next_task_id: 0,
            tally: Tally::new(config.failure_order),
            queue,
            events,
            slots,
        }
    }

    async fn run<I>(mut self, inputs: I) -> EngineResult<MaybeResult<F::Output>>
    where
        I: Iterator<Item = F::Input>,
    {
        for (index, argument) in inputs.enumerate() {
            self.submit(index, argument, 1)?;
        }
        debug!("Submitted {} task(s) to the pool", self.pending.len());

        let deadline = self.config.total_timeout.map(|t| self.started_at + t);
        while !self.pending.is_empty() {
            let event = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline.into(), self.events.recv()).await {
                        Ok(event) => event,
                        Err(_) => return Err(self.abandon()),
                    }
                }
                None => self.events.recv().await,
            };

            match event {
                Some(PoolEvent::Finished {
                    task_id,
                    outcome,
                    exit,
                }) => self.finished(task_id, outcome, exit)?,
                Some(PoolEvent::Fatal(err)) => {
                    self.slots.abort_all();
                    return Err(err);
                }
                None => {
                    return Err(EngineError::internal(
                        "all pool slots stopped while tasks were outstanding",
                    ))
                }
            }
        }

        // Closing the queue lets every slot retire its worker
        let Self {
            queue,
            mut slots,
            tally,
            ..
        } = self;
        drop(queue);
        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                warn!("Pool slot ended abnormally: {}", e);
            }
        }

        info!(
            "Map-reduce finished: {} input(s), {} failure(s)",
            tally.settled(),
            tally.failure_count()
        );
        Ok(tally.finish())
    }

    fn submit(&mut self, index: usize, argument: F::Input, attempt: u32) -> EngineResult<()> {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let encoded = encode_value("task argument", &argument)?;
        let line = TaskRequest::new(task_id, F::NAME, self.payload.clone(), encoded).to_line()?;
        self.queue
            .send(Unit { task_id, line })
            .map_err(|_| EngineError::internal("pool queue closed during submission"))?;
        self.pending.insert(
            task_id,
            UnitRecord {
                index,
                argument,
                attempt,
            },
        );
        Ok(())
    }

    fn finished(
        &mut self,
        task_id: u64,
        outcome: Result<Value, TaskError>,
        exit: Option<ExitInfo>,
    ) -> EngineResult<()> {
        let Some(record) = self.pending.remove(&task_id) else {
            debug!(task_id, "Ignoring result for an unknown task");
            return Ok(());
        };

        let retries = self.config.task_retries;
        let mut failures = Vec::new();
        let result = match outcome.and_then(|value| {
            serde_json::from_value::<F::Output>(value)
                .map_err(|e| TaskError::decode("task output", e))
        }) {
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
            return self.submit(record.index, record.argument, record.attempt + 1);
        }

        debug!(task_id, failures = failures.len(), "Task settled");
        self.tally
            .absorb(record.index, MaybeResult::new(result, failures));
        Ok(())
    }

    /// Give up on the batch; dropping the slots kills their workers
    fn abandon(&mut self) -> EngineError {
        let timeout = self.config.total_timeout.unwrap_or_default();
        let outstanding = self.pending.len();
        warn!(
            "Total timeout of {:?} elapsed with {} task(s) outstanding",
            timeout, outstanding
        );
        self.slots.abort_all();
        EngineError::BatchTimeout {
            timeout,
            outstanding,
        }
    }
}

/// One pool position: owns at most one worker at a time
struct PoolSlot {
    slot: usize,
    backend: IsolationBackend,
    recycle_limit: Option<usize>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Unit>>>,
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl PoolSlot {
    async fn run(self) {
        let mut worker: Option<WorkerProcess> = None;
        let mut served = 0usize;

        loop {
            let unit = { self.queue.lock().await.recv().await };
            let Some(unit) = unit else {
                break;
            };

            let mut active = match worker.take() {
                Some(active) => active,
                None => match WorkerProcess::spawn(&self.backend) {
                    Ok(spawned) => {
                        debug!(slot = self.slot, pid = ?spawned.pid(), "Started pool worker");
                        served = 0;
                        spawned
                    }
                    Err(err) => {
                        let _ = self.events.send(PoolEvent::Fatal(err));
                        return;
                    }
                },
            };

            let (outcome, exit) = match exchange(&mut active, &unit).await {
                Some(response) => {
                    served += 1;
                    let exit = if let Some(code) = response.exit_requested {
                        debug!(slot = self.slot, code, "Pool worker asked to exit");
                        self.retire(active).await
                    } else if self.recycle_limit.is_some_and(|limit| served >= limit) {
                        debug!(slot = self.slot, served, "Recycling pool worker");
                        self.retire(active).await
                    } else {
                        worker = Some(active);
                        None
                    };
                    (response.outcome, exit)
                }
                None => {
                    let exit = self.bury(active).await;
                    warn!(slot = self.slot, task_id = unit.task_id, %exit, "Pool worker died mid-task");
                    (Err(TaskError::WorkerLost { exit }), None)
                }
            };

            let finished = PoolEvent::Finished {
                task_id: unit.task_id,
                outcome,
                exit,
            };
            if self.events.send(finished).is_err() {
                break;
            }
        }

        if let Some(active) = worker {
            self.retire(active).await;
        }
    }

    /// Close the worker's input and wait for it to exit on its own.
    ///
    /// Returns the exit status, or `None` when the worker had to be killed.
    async fn retire(&self, mut worker: WorkerProcess) -> Option<ExitInfo> {
        worker.close_stdin();
        match worker.reap(REAP_GRACE).await {
            Ok(Some(exit)) => Some(exit),
            Ok(None) | Err(_) => {
                warn!(
                    slot = self.slot,
                    pid = ?worker.pid(),
                    program = worker.program(),
                    "Pool worker did not exit, killing it"
                );
                worker.kill();
                let _ = worker.reap(REAP_GRACE).await;
                None
            }
        }
    }

    /// Collect the status of a worker that stopped answering
    async fn bury(&self, mut worker: WorkerProcess) -> ExitInfo {
        if let Ok(Some(exit)) = worker.reap(REAP_GRACE).await {
            return exit;
        }
        worker.kill();
        match worker.reap(REAP_GRACE).await {
            Ok(Some(exit)) => exit,
            _ => ExitInfo {
                code: None,
                signal: None,
            },
        }
    }
}

/// Hand one unit to a worker; `None` means the worker went away
async fn exchange(worker: &mut WorkerProcess, unit: &Unit) -> Option<TaskResponse> {
    if let Err(e) = worker.send_line(&unit.line).await {
        debug!(task_id = unit.task_id, "Failed to hand task to pool worker: {}", e);
        return None;
    }
    match worker.receive(unit.task_id).await {
        Ok(Some(response)) => Some(response),
        Ok(None) => None,
        Err(e) => {
            debug!(task_id = unit.task_id, "Reading pool worker output failed: {}", e);
            None
        }
    }
}
