//! Command-line interface definitions for the Stratum controller.
//!
//! This module defines the CLI structure using clap: the default invocation
//! starts the stdio protocol server; `validate` runs the offline validator;
//! `setup` performs one-shot project configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stratum — a typed-contract enforcement plane for agentic flow execution
/// over MCP.
#[derive(Parser)]
#[command(
    name = "stratum",
    version,
    about = "MCP controller server that enforces typed flow-spec contracts over stdio",
    long_about = "Stratum parses and validates declarative flow specs, schedules step \
dispatch, and evaluates postconditions against results an executor reports back, \
exposing the whole cycle as four MCP tools over a stdio transport."
)]
pub struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file to load; defaults to the OS config directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the stdio MCP protocol server loop (the default if no subcommand
    /// is given).
    Serve,

    /// Offline-validate a flow spec: a file path if it exists, otherwise the
    /// argument is treated as inline spec text.
    Validate(ValidateArgs),

    /// One-shot project configuration: write a config file and register the
    /// server in the project's agent-instruction file.
    Setup(SetupArgs),
}

/// Arguments for the `validate` command.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// A file path to a spec document, or inline spec text if no such file
    /// exists.
    pub path_or_text: String,

    /// Also write the validation outcome as a diagnostic report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Arguments for the `setup` command.
#[derive(Parser, Debug)]
pub struct SetupArgs {
    /// Project directory to configure; defaults to the current directory.
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}
