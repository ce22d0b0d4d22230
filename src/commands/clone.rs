//! # Clone Command Implementation
//!
//! This module implements the `clone` subcommand, a drop-in replacement for
//! `git clone` that borrows objects from the cache.
//!
//! ## Flow
//!
//! 1. Add the repository to the cache unless `--clone-only` is given.
//! 2. With `--refresh`, fetch into an already cached repository.
//! 3. `git clone --reference <cached clone>` into the destination.
//!
//! If any step fails, the repository is cloned without the cache unless
//! `--no-retry` is given.
//!
//! ## Arguments
//!
//! `git-cache clone [OPTIONS] <URI> [DEST] [GIT_ARGS]...`
//!
//! A value right after the URI that does not start with `-` is the
//! destination. Everything after that is passed to `git clone`.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use git_cache::manager::{CloneOptions, CloneOutcome};

use super::{join_args, split_leading, GlobalArgs};

/// Clone a repository, using the cache as reference
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Repository URL (https, ssh or user@host:path)
    #[arg(value_name = "URI")]
    pub uri: String,

    /// Only clone from an existing cached repository, never add it
    #[arg(long)]
    pub clone_only: bool,

    /// Fail instead of falling back to a plain clone
    #[arg(long)]
    pub no_retry: bool,

    /// Fetch into the cached repository before cloning from it
    #[arg(long)]
    pub refresh: bool,

    /// Copy borrowed objects so the clone does not depend on the cache
    #[arg(long)]
    pub dissociate: bool,

    /// Directory to clone into (git picks one from the URI when omitted),
    /// then extra arguments for git clone
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "DEST_AND_GIT_ARGS"
    )]
    pub rest: Vec<String>,
}

impl CloneArgs {
    /// The destination directory and the arguments for git clone.
    fn dest_and_git_args(&self) -> (Option<PathBuf>, &[String]) {
        let (dest, git_args) = split_leading(&self.rest);
        (dest.map(PathBuf::from), git_args)
    }

    fn options(&self, global: &GlobalArgs) -> CloneOptions {
        let verbosity = global.git_verbosity_args();
        let (dest, git_args) = self.dest_and_git_args();
        CloneOptions {
            dest,
            dissociate: self.dissociate,
            add: !self.clone_only,
            refresh: self.refresh,
            fallback: !self.no_retry,
            clone_args: join_args(&verbosity, git_args),
            cache_args: verbosity,
        }
    }
}

/// Execute the `clone` command.
pub fn execute(global: &GlobalArgs, args: CloneArgs) -> Result<()> {
    let mut manager = global.manager();
    let result = manager.clone(&args.uri, &args.options(global));
    manager.commit_metadata();

    match result.with_context(|| format!("Failed to clone {}", args.uri))? {
        CloneOutcome::Cached => log::info!("cloned {} from cache", args.uri),
        CloneOutcome::Uncached => log::info!("cloned {} without cache", args.uri),
    }
    Ok(())
}
