//! Application configuration

/// Process-wide settings derived from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Whether this process serves tasks instead of coordinating them
    pub worker: bool,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            worker: false,
        }
    }

    pub fn for_worker(verbose: u8) -> Self {
        Self {
            verbose,
            worker: true,
        }
    }

    /// Get the log filter directive based on verbosity.
    ///
    /// Workers stay quiet unless asked, so their stderr does not drown the
    /// coordinator's own output.
    pub fn log_level(&self) -> &'static str {
        match (self.worker, self.verbose) {
            (true, 0) => "warn",
            (_, 0) => "info",
            (_, 1) => "debug",
            _ => "trace",
        }
    }
}
