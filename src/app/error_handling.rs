//! Error handling utilities

use crate::error::EngineError;
use tracing::error;

/// Handle fatal errors and exit with appropriate status code
///
/// - For `EngineError`: shows the user message, plus the source chain in
///   verbose mode, and exits with the error's own exit code
/// - For other errors: shows the error (chain in verbose mode) and exits 1
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);
    let exit_code = report(&error, verbose);
    std::process::exit(exit_code)
}

/// Print `error` to stderr and pick the exit code
fn report(error: &anyhow::Error, verbose: u8) -> i32 {
    let exit_code = match error.downcast_ref::<EngineError>() {
        Some(engine_err) => {
            eprintln!("{}", engine_err.user_message());
            engine_err.exit_code()
        }
        None => {
            eprintln!("Error: {error}");
            1
        }
    };

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }
    exit_code
}
