//! Application module
//!
//! Binary-level plumbing shared by the `run` and `worker` commands:
//! - Configuration of the process itself (verbosity)
//! - Logging setup
//! - Fatal error reporting

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
