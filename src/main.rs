//! # git-cache CLI
//!
//! This is the binary entry point for the `git-cache` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Setting up logging.
//! - Executing the appropriate command based on the parsed arguments.
//!
//! The core logic lives in the `git_cache` library crate; the binary is a thin
//! wrapper around it. Any error returned by a command exits with status 1.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
