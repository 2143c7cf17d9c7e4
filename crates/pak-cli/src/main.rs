//! pak - package installation and execution runtime

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pak_cli::cmd;
use pak_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let quiet = cli.quiet;

    let code = match cli.command {
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            0
        }
        command => {
            // Installs block on the runtime for network fetches, so they run
            // off the worker threads.
            let runtime = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || cmd::dispatch(command, runtime, quiet))
                .await
                .context("Command worker panicked")??
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
