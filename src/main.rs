use clap::Parser;
use procmap::app::{handle_fatal_error, init_logging, AppConfig};
use procmap::cli::{execute_command, Cli, Commands};
use procmap::{probes, worker};

#[tokio::main]
async fn main() {
    // Re-executed as a worker: the command line is whatever the backend passed
    if worker::is_worker_process() {
        init_logging(&AppConfig::for_worker(0));
        if let Err(e) = worker::serve_stdio(&probes::registry()) {
            handle_fatal_error(e, 0);
        }
        return;
    }

    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config = match cli.command {
        Commands::Worker => AppConfig::for_worker(verbose),
        Commands::Run(_) => AppConfig::new(verbose),
    };
    init_logging(&config);

    match execute_command(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => handle_fatal_error(e, verbose),
    }
}
