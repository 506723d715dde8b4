//! The worker side of process isolation
//!
//! Worker binaries build a [`Registry`] of the task functions they can run and
//! hand it to [`serve_stdio`]. Coordinators use [`WorkerProcess`] to start,
//! feed, kill and reap those binaries.

pub mod exit;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod serve;

pub use exit::ExitInfo;
pub use process::WorkerProcess;
pub use protocol::{TaskRequest, TaskResponse, WORKER_ENV};
pub use registry::Registry;
pub use serve::{exit_after_serving, is_worker_process, serve, serve_stdio};
