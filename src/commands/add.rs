//! # Add Command Implementation
//!
//! This module implements the `add` subcommand, which clones a repository
//! into its pod in the cache.
//!
//! ## Functionality
//!
//! - **Idempotent**: adding a repository that is already cached is not an
//!   error; it is reported and left alone.
//! - **Refresh**: with `--refresh`, an already cached repository is fetched
//!   instead.
//! - **Git arguments**: anything after the URI that `git-cache` does not
//!   recognize is passed to `git clone`; `--` forces the rest through.

use anyhow::{Context, Result};
use clap::Args;

use git_cache::error::Error;

use super::{join_args, GlobalArgs};

/// Clone a repository into the cache
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Repository URL (https, ssh or user@host:path)
    #[arg(value_name = "URI")]
    pub uri: String,

    /// Fetch into the cached clone if the repository is already cached
    #[arg(long)]
    pub refresh: bool,

    /// Extra arguments for git clone; everything after the URI is passed on
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "GIT_ARGS")]
    pub git_args: Vec<String>,
}

/// Execute the `add` command.
pub fn execute(global: &GlobalArgs, args: AddArgs) -> Result<()> {
    let mut manager = global.manager();
    let clone_args = join_args(&global.git_verbosity_args(), &args.git_args);

    let result = manager.add(&args.uri, &clone_args, args.refresh);
    manager.commit_metadata();

    match result {
        Ok(()) => {
            println!("✅ {} is cached", args.uri);
            Ok(())
        }
        Err(Error::RepoAlreadyExists { uri }) => {
            println!("{} is already cached", uri);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to add {} to the cache", args.uri)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        add: AddArgs,
    }

    fn parse(args: &[&str]) -> AddArgs {
        TestCli::parse_from(std::iter::once("git-cache").chain(args.iter().copied())).add
    }

    #[test]
    fn test_unknown_flags_pass_through() {
        let args = parse(&["https://example.com/r.git", "--depth", "1", "--no-tags"]);
        assert_eq!(args.uri, "https://example.com/r.git");
        assert_eq!(args.git_args, vec!["--depth", "1", "--no-tags"]);
        assert!(!args.refresh);
    }

    #[test]
    fn test_own_flags_before_git_args() {
        let args = parse(&["--refresh", "https://example.com/r.git", "--depth", "1"]);
        assert!(args.refresh);
        assert_eq!(args.git_args, vec!["--depth", "1"]);

        let args = parse(&["https://example.com/r.git", "--refresh"]);
        assert!(args.refresh);
        assert!(args.git_args.is_empty());
    }

    #[test]
    fn test_double_dash_still_accepted() {
        let args = parse(&["https://example.com/r.git", "--", "--refresh"]);
        assert!(!args.refresh);
        assert_eq!(args.git_args, vec!["--refresh"]);
    }
}
