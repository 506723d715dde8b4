//! Command routing and execution

use crate::cli::args::Commands;
use crate::cli::run::run_command;
use crate::probes;
use crate::worker::serve_stdio;
use anyhow::Result;

/// Execute a CLI command, returning the process exit status
pub async fn execute_command(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => run_command(args).await,
        Commands::Worker => {
            // Blocking stdio loop; nothing else runs on this runtime meanwhile
            tokio::task::block_in_place(|| serve_stdio(&probes::registry()))?;
            Ok(0)
        }
    }
}
