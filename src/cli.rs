//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, GlobalArgs};

/// git-cache - Clone git repositories through a local reference cache
#[derive(Parser, Debug)]
#[command(name = "git-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a repository into the cache
    Add(commands::add::AddArgs),

    /// Clone a repository, using the cache as reference
    Clone(commands::clone::CloneArgs),

    /// Fetch new objects into cached repositories
    Refresh(commands::refresh::RefreshArgs),

    /// Remove repositories from the cache
    Clean(commands::clean::CleanArgs),

    /// Show what is known about cached repositories
    Info(commands::info::InfoArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::new()
            .filter_level(self.global.log_filter())
            .parse_default_env()
            .init();

        match self.command {
            Commands::Add(args) => commands::add::execute(&self.global, args),
            Commands::Clone(args) => commands::clone::execute(&self.global, args),
            Commands::Refresh(args) => commands::refresh::execute(&self.global, args),
            Commands::Clean(args) => commands::clean::execute(&self.global, args),
            Commands::Info(args) => commands::info::execute(&self.global, args),
        }
    }
}
