//! CLI commands for the atelier server.
//!
//! - `serve`: start the HTTP server, bus listener, and timeout sweep
//! - `sweep`: run one timeout sweep pass and exit
//! - `init`: write a default `atelier.toml` to the working directory

use clap::{Parser, Subcommand};
use tracing::info;

use crate::server;

/// Atelier design-module coordination service
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(about = "Product-development coordination service")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "atelier.toml", env = "ATELIER_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Run a single timeout sweep pass and exit
    Sweep,
    /// Write a default configuration file
    Init,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = server::load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Serve) | None => server::run(config).await,
        Some(Commands::Sweep) => {
            let count = server::run_sweep_once(config).await?;
            info!(count, "sweep finished");
            Ok(())
        }
        Some(Commands::Init) => {
            server::write_default_config(&cli.config)?;
            info!(path = %cli.config, "wrote default configuration");
            Ok(())
        }
    }
}
