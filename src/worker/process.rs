//! Worker process lifecycle handling
//!
//! A [`WorkerProcess`] is the coordinator's handle on one spawned worker: it
//! feeds requests into the worker's stdin, reads responses from its stdout,
//! force-kills it and reaps it.

use super::exit::ExitInfo;
use super::protocol::{TaskResponse, WORKER_ENV};
use crate::config::IsolationBackend;
use crate::error::{EngineError, EngineResult};
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

/// Buffered reader over a worker's stdout
pub type ResponseReader = BufReader<ChildStdout>;

/// Handle on a running worker process
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
    program: String,
    started_at: Instant,
    stdin: Option<ChildStdin>,
    stdout: Option<ResponseReader>,
}

impl WorkerProcess {
    /// Start a worker using the given backend.
    ///
    /// The worker gets piped stdin/stdout, inherits stderr, runs in its own
    /// process group and is killed if the handle is dropped.
    pub fn spawn(backend: &IsolationBackend) -> EngineResult<Self> {
        let (program, args) = backend.command_line()?;
        let program_name = program.display().to_string();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group so a kill also reaches anything the task started
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: program_name.clone(),
            source,
        })?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);
        trace!(?pid, program = %program_name, "Spawned worker process");

        Ok(Self {
            child,
            pid,
            program: program_name,
            started_at: Instant::now(),
            stdin,
            stdout,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Write one protocol line to the worker's stdin
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin is closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    /// Close stdin, which tells the worker to stop after its current request
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Detach the stdout reader, e.g. to read it from a separate task
    pub fn take_stdout(&mut self) -> Option<ResponseReader> {
        self.stdout.take()
    }

    /// Wait for the response to `task_id`; `None` if stdout closes first
    pub async fn receive(&mut self, task_id: u64) -> io::Result<Option<TaskResponse>> {
        match self.stdout.as_mut() {
            Some(reader) => read_response(reader, task_id).await,
            None => Ok(None),
        }
    }

    /// Forcibly terminate the worker and its process group.
    ///
    /// There is no graceful shutdown: the task loses whatever it was doing.
    pub fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                trace!(pid, "killpg failed: {}", e);
            }
        }

        if let Err(e) = self.child.start_kill() {
            trace!(pid = ?self.pid, "start_kill failed: {}", e);
        }
    }

    /// Wait up to `grace` for the worker to exit and collect its status.
    ///
    /// Returns `Ok(None)` when the worker is still running after `grace`.
    pub async fn reap(&mut self, grace: Duration) -> io::Result<Option<ExitInfo>> {
        self.stdin.take();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                let exit = ExitInfo::from(status);
                debug!(pid = ?self.pid, %exit, uptime = ?self.uptime(), "Reaped worker process");
                Ok(Some(exit))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// Read lines until the response to `task_id` arrives.
///
/// Lines that are not protocol responses are skipped; responses for other
/// task ids are logged and skipped. Returns `None` on end of stream.
pub async fn read_response(
    reader: &mut ResponseReader,
    task_id: u64,
) -> io::Result<Option<TaskResponse>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        match TaskResponse::parse(&line) {
            Some(response) if response.task_id == task_id => return Ok(Some(response)),
            Some(response) => {
                debug!(
                    expected = task_id,
                    received = response.task_id,
                    "Skipping response for another task"
                );
            }
            None => trace!(task_id, "Skipping non-protocol worker output: {}", line.trim_end()),
        }
    }
}

/// Consume the rest of a worker's stdout, logging anything it prints
pub async fn drain(reader: &mut ResponseReader) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => trace!("Worker output after delivery: {}", line.trim_end()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell(script: &str) -> IsolationBackend {
        IsolationBackend::Program {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn test_reap_reports_exit_code() {
        let mut worker = WorkerProcess::spawn(&shell("exit 3")).unwrap();
        let exit = worker.reap(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(exit.code, Some(3));
    }

    #[tokio::test]
    async fn test_reap_times_out_on_running_process() {
        let mut worker = WorkerProcess::spawn(&shell("sleep 30")).unwrap();
        let exit = worker.reap(Duration::from_millis(100)).await.unwrap();
        assert!(exit.is_none());

        worker.kill();
        let exit = worker.reap(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(exit.signal, Some(9));
    }

    #[tokio::test]
    async fn test_kill_reaches_process_group() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let mut worker =
            WorkerProcess::spawn(&shell("sleep 60 & echo $!; wait")).unwrap();
        let mut reader = worker.take_stdout().unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let grandchild: i32 = line.trim().parse().unwrap();

        worker.kill();
        worker.reap(Duration::from_secs(5)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The grandchild was reparented and reaped by init, or is a zombie at worst
        let alive = kill(Pid::from_raw(grandchild), None).is_ok()
            && std::fs::read_to_string(format!("/proc/{}/stat", grandchild))
                .map(|stat| !stat.contains(") Z "))
                .unwrap_or(false);
        assert!(!alive, "grandchild {} survived the group kill", grandchild);
    }

    #[tokio::test]
    async fn test_read_response_skips_noise() {
        let script = r#"echo "warming up"; echo '{"task_id":1,"outcome":{"Ok":1}}'; echo '{"task_id":2,"outcome":{"Ok":2}}'"#;
        let mut worker = WorkerProcess::spawn(&shell(script)).unwrap();

        let response = worker.receive(2).await.unwrap().unwrap();
        assert_eq!(response.task_id, 2);
        assert_eq!(response.outcome, Ok(serde_json::json!(2)));
        assert!(worker.receive(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let backend = IsolationBackend::program("/definitely/not/a/worker", &[]);
        let err = WorkerProcess::spawn(&backend).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
