//! # Info Command Implementation
//!
//! This module implements the `info` subcommand, which displays whether a
//! repository is cached and the usage metadata recorded for it.
//!
//! ## Functionality
//!
//! - **Single repository**: `info <URI>` shows one repository.
//! - **Everything**: `info --all` shows every repository with recorded metadata.
//! - **JSON**: `--json` prints the same information as JSON.
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use git_cache::manager::RepoInfo;

use super::GlobalArgs;

/// Show what is known about cached repositories
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Repository URL (https, ssh or user@host:path)
    #[arg(value_name = "URI", required_unless_present = "all")]
    pub uri: Option<String>,

    /// Show every repository with recorded metadata
    #[arg(long, conflicts_with = "uri")]
    pub all: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Execute the `info` command.
pub fn execute(global: &GlobalArgs, args: InfoArgs) -> Result<()> {
    let manager = global.manager();

    match &args.uri {
        Some(uri) if !args.all => {
            let info = manager
                .info(uri)
                .with_context(|| format!("Failed to read cache metadata for {}", uri))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                display_info(&info);
            }
        }
        _ => {
            let infos = manager
                .info_all()
                .context("Failed to read cache metadata")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else if infos.is_empty() {
                println!("No repositories in cache metadata.");
            } else {
                for (i, info) in infos.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    display_info(info);
                }
            }
        }
    }

    Ok(())
}

fn display_info(info: &RepoInfo) {
    println!("📦 {}", info.normalized_uri);
    println!("  cached:          {}", if info.cached { "yes" } else { "no" });
    println!("  path:            {}", info.pod_dir.display());

    let Some(record) = &info.record else {
        println!("  not in cache metadata");
        return;
    };

    println!("  added:           {}", format_date(record.added_date));
    if record.removed_date.is_some() {
        println!("  removed:         {}", format_date(record.removed_date));
    }
    println!("  last fetched:    {}", format_date(record.last_fetched_date));
    if record.last_pruned_date.is_some() {
        println!("  last pruned:     {}", format_date(record.last_pruned_date));
    }
    println!("  last used:       {}", format_date(record.last_used_date));
    println!("  uses:            {}", record.total_num_used.unwrap_or(0));
    println!(
        "  avg clone time:  {}",
        format_seconds(record.avg_ref_clone_time_sec)
    );
    println!("  add clone time:  {}", format_seconds(record.clone_time_sec));
    println!(
        "  disk usage:      {}",
        record
            .disk_usage_kb
            .map(format_size_kb)
            .unwrap_or_else(|| "-".to_string())
    );
    if !record.potential_dependents.is_empty() {
        println!("  dependents:");
        for dependent in &record.potential_dependents {
            println!("    {}", dependent.display());
        }
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn format_seconds(secs: Option<f64>) -> String {
    secs.map(|s| format!("{:.2}s", s))
        .unwrap_or_else(|| "-".to_string())
}

/// Format a size in KiB as a human-readable string.
fn format_size_kb(kb: u64) -> String {
    const MB: u64 = 1024;
    const GB: u64 = MB * 1024;

    if kb >= GB {
        format!("{:.2} GB", kb as f64 / GB as f64)
    } else if kb >= MB {
        format!("{:.2} MB", kb as f64 / MB as f64)
    } else {
        format!("{} KB", kb)
    }
}
