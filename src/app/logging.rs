//! Logging configuration and initialization
//!
//! Logs always go to stderr: a coordinator's stdout carries results and a
//! worker's stdout carries the task protocol.

use crate::app::config::AppConfig;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process.
///
/// `RUST_LOG` takes precedence over the verbosity-derived level.
pub fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(config.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(config.verbose >= 3) // Show line numbers for -vvv
        .try_init();
    if initialized.is_err() {
        return;
    }

    debug!(
        worker = config.worker,
        "procmap started with verbosity level: {}", config.verbose
    );
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
