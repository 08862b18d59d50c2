//! Stratum — a typed-contract enforcement plane for agentic flow execution
//! over MCP.
//!
//! This binary exposes three surfaces (§6): the default stdio protocol
//! server loop, an offline `validate` subcommand, and a best-effort `setup`
//! subcommand. Logs never touch stdout — stdout is reserved exclusively for
//! the protocol transport.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod paths;
mod transport;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stratum starting up");
    tracing::debug!(?cli.command, "parsed command");

    let exit_code = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::run().await?,
        Commands::Validate(args) => commands::validate::run(args).await?,
        Commands::Setup(args) => commands::setup::run(args).await?,
    };

    std::process::exit(exit_code as i32);
}

/// Initialize file-only structured logging. Stdout/stderr are left clean for
/// the protocol transport and for `validate`'s OK/error output.
fn init_logging(verbose: u8) -> Result<()> {
    let paths = paths::get_stratum_paths()?;

    let default_filter = if verbose > 0 { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let log_file_path = paths.log_file("stratum");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_file_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    tracing::debug!(log_file = %log_file_path.display(), "logging initialized");

    Ok(())
}
