//! # Clean Command Implementation
//!
//! This module implements the `clean` subcommand, which removes one cached
//! repository or, with `--all`, every cached repository.
//!
//! With `--unused-for DAYS`, only repositories that have not been cloned from
//! within that many days are removed.

use anyhow::{bail, Context, Result};
use clap::Args;

use super::GlobalArgs;

/// Remove repositories from the cache
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Repository URL (https, ssh or user@host:path)
    #[arg(value_name = "URI", required_unless_present = "all")]
    pub uri: Option<String>,

    /// Clean every cached repository
    #[arg(long, conflicts_with = "uri")]
    pub all: bool,

    /// Only remove repositories not cloned from within this many days
    #[arg(long, value_name = "DAYS")]
    pub unused_for: Option<u64>,
}

/// Execute the `clean` command.
pub fn execute(global: &GlobalArgs, args: CleanArgs) -> Result<()> {
    let mut manager = global.manager();

    let result = match &args.uri {
        Some(uri) if !args.all => manager
            .clean(uri, args.unused_for)
            .with_context(|| format!("Failed to clean {}", uri))
            .map(|removed| {
                if removed {
                    println!("🗑️  Removed {} from the cache", uri);
                } else {
                    println!("Nothing to remove for {}", uri);
                }
            }),
        _ => clean_all(&mut manager, args.unused_for),
    };
    manager.commit_metadata();
    result
}

fn clean_all(
    manager: &mut git_cache::manager::CacheManager,
    unused_for: Option<u64>,
) -> Result<()> {
    let outcome = manager
        .clean_all(unused_for)
        .context("Failed to list cached repositories")?;

    println!(
        "Removed {} cached repositories, kept {}",
        outcome.processed, outcome.skipped
    );
    if !outcome.is_success() {
        for (pod_dir, err) in &outcome.failures {
            eprintln!("  {}: {}", pod_dir.display(), err);
        }
        bail!(
            "Failed to clean {} cached repositories",
            outcome.failures.len()
        );
    }
    Ok(())
}
