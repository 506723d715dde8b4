//! CLI command handlers
//!
//! This module contains all CLI-related functionality including:
//! - Argument parsing structures
//! - Command implementations
//! - Routing from parsed arguments to commands

pub mod args;
pub mod router;
pub mod run;

// Re-export the main CLI structures for convenience
pub use args::{Cli, Commands, EngineKind, RunArgs};
pub use router::execute_command;
