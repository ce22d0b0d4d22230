//! # Refresh Command Implementation
//!
//! This module implements the `refresh` subcommand, which fetches new objects
//! into one cached repository or, with `--all`, into every cached repository.
//!
//! Refreshing a repository that is not cached is reported and skipped unless
//! `--add` is given, in which case it is cloned instead.
//!
//! Arguments after the URI (or after `--all`) that `git-cache` does not
//! recognize are passed to `git fetch`.

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Args;

use git_cache::error::Error;

use super::{join_args, split_leading, GlobalArgs};

/// Fetch new objects into cached repositories
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Refresh every cached repository
    #[arg(long, conflicts_with = "add")]
    pub all: bool,

    /// Clone the repository into the cache if it is not cached yet
    #[arg(long)]
    pub add: bool,

    /// Repository URL (https, ssh or user@host:path), then extra arguments
    /// for git fetch
    #[arg(
        required_unless_present = "all",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "URI_AND_GIT_ARGS"
    )]
    pub rest: Vec<String>,
}

/// Which repositories to refresh.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    One(&'a str),
    All,
}

impl RefreshArgs {
    /// The repositories to refresh and the arguments for git fetch.
    fn target(&self) -> Result<(Target<'_>, &[String]), clap::Error> {
        let (uri, git_args) = split_leading(&self.rest);
        match (uri, self.all) {
            (Some(uri), false) => Ok((Target::One(uri), git_args)),
            (None, true) => Ok((Target::All, git_args)),
            (Some(uri), true) => Err(clap::Error::raw(
                ErrorKind::ArgumentConflict,
                format!("the argument '--all' cannot be used with '{}'\n", uri),
            )),
            (None, false) => Err(clap::Error::raw(
                ErrorKind::MissingRequiredArgument,
                "a repository URI is required unless '--all' is given\n",
            )),
        }
    }
}

/// Execute the `refresh` command.
pub fn execute(global: &GlobalArgs, args: RefreshArgs) -> Result<()> {
    let (target, git_args) = args.target().unwrap_or_else(|e| e.exit());
    let fetch_args = join_args(&global.git_verbosity_args(), git_args);
    let mut manager = global.manager();

    let result = match target {
        Target::One(uri) => refresh_one(&mut manager, uri, &fetch_args, args.add),
        Target::All => refresh_all(&mut manager, &fetch_args),
    };
    manager.commit_metadata();
    result
}

fn refresh_one(
    manager: &mut git_cache::manager::CacheManager,
    uri: &str,
    fetch_args: &[String],
    allow_create: bool,
) -> Result<()> {
    match manager.refresh(uri, fetch_args, allow_create) {
        Ok(()) => {
            println!("✅ Refreshed {}", uri);
            Ok(())
        }
        Err(Error::RepoNotFound { uri }) => {
            log::warn!("{} is not cached, nothing to refresh", uri);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to refresh {}", uri)),
    }
}

fn refresh_all(
    manager: &mut git_cache::manager::CacheManager,
    fetch_args: &[String],
) -> Result<()> {
    let outcome = manager
        .refresh_all(fetch_args)
        .context("Failed to list cached repositories")?;

    println!("Refreshed {} cached repositories", outcome.processed);
    if !outcome.is_success() {
        for (pod_dir, err) in &outcome.failures {
            eprintln!("  {}: {}", pod_dir.display(), err);
        }
        bail!(
            "Failed to refresh {} cached repositories",
            outcome.failures.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        refresh: RefreshArgs,
    }

    fn parse(args: &[&str]) -> RefreshArgs {
        TestCli::parse_from(std::iter::once("git-cache").chain(args.iter().copied())).refresh
    }

    #[test]
    fn test_one_with_fetch_args() {
        let args = parse(&["https://example.com/r.git", "--prune", "--tags"]);
        let (target, git_args) = args.target().unwrap();
        assert_eq!(target, Target::One("https://example.com/r.git"));
        assert_eq!(git_args, ["--prune", "--tags"]);
    }

    #[test]
    fn test_all_with_fetch_args() {
        let args = parse(&["--all", "--", "--prune"]);
        let (target, git_args) = args.target().unwrap();
        assert_eq!(target, Target::All);
        assert_eq!(git_args, ["--prune"]);

        let args = parse(&["--all"]);
        let (target, git_args) = args.target().unwrap();
        assert_eq!(target, Target::All);
        assert!(git_args.is_empty());
    }

    #[test]
    fn test_all_conflicts_with_uri() {
        let err = parse(&["--all", "https://example.com/r.git"])
            .target()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_uri_required_without_all() {
        let err = parse(&["--", "--prune"]).target().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(TestCli::try_parse_from(["git-cache"]).is_err());
    }
}
