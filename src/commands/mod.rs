//! # CLI Command Implementations
//!
//! One module per `git-cache` subcommand. Each module defines an `Args`
//! struct derived with `clap` and an `execute` function that builds a
//! [`CacheManager`] from the global options and calls into the `git_cache`
//! library.
//!
//! Options shared by every subcommand live in [`GlobalArgs`].

pub mod add;
pub mod clean;
pub mod clone;
pub mod info;
pub mod refresh;

use std::path::PathBuf;

use clap::Args;
use log::LevelFilter;

use git_cache::config::{CacheConfig, ConfigOverrides, MetadataStoreKind};
use git_cache::git::{CloneMode, SystemGit};
use git_cache::manager::CacheManager;

const LEVELS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];

/// Options accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// The root directory of the cache.
    ///
    /// Defaults to the `gitcache.rootdir` git config key, then to the system
    /// data directory (`~/.local/share/git-cache` on Linux).
    #[arg(long, global = true, value_name = "DIR", env = "GIT_CACHE_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Do not lock cached repositories.
    ///
    /// Unsafe when several git-cache processes use the same cache.
    #[arg(long, global = true, env = "GIT_CACHE_NO_LOCK")]
    pub no_lock: bool,

    /// Seconds to wait for a lock: 0 fails immediately, negative waits forever.
    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        env = "GIT_CACHE_LOCK_TIMEOUT",
        allow_negative_numbers = true
    )]
    pub timeout: Option<i64>,

    /// How repositories are cloned into the cache (bare, mirror).
    #[arg(long, global = true, value_name = "MODE", env = "GIT_CACHE_CLONE_MODE")]
    pub clone_mode: Option<CloneMode>,

    /// Where usage metadata is kept (none, json, sqlite).
    #[arg(long, global = true, value_name = "STORE", env = "GIT_CACHE_METADATA_STORE")]
    pub metadata_store: Option<MetadataStoreKind>,

    /// Set log level (off, error, warn, info, debug, trace)
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "warn",
        value_parser = ["off", "error", "warn", "info", "debug", "trace"]
    )]
    pub log_level: String,

    /// More output; also passed to git as --verbose
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less output; also passed to git as --quiet
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl GlobalArgs {
    /// Log level from `--log-level`, raised by `-v` and lowered by `-q`.
    pub fn log_filter(&self) -> LevelFilter {
        let base = LEVELS
            .iter()
            .position(|level| level.as_str().eq_ignore_ascii_case(&self.log_level))
            .unwrap_or(2);
        let index = (base + usize::from(self.verbose)).saturating_sub(usize::from(self.quiet));
        LEVELS[index.min(LEVELS.len() - 1)]
    }

    /// `--verbose` / `--quiet` flags to forward to git.
    pub fn git_verbosity_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        args.extend((0..self.verbose).map(|_| "--verbose".to_string()));
        args.extend((0..self.quiet).map(|_| "--quiet".to_string()));
        args
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root_dir: self.root_dir.clone(),
            no_lock: self.no_lock,
            lock_timeout: self.timeout,
            clone_mode: self.clone_mode,
            metadata_store: self.metadata_store,
        }
    }

    /// A manager for the resolved configuration, running the system git.
    pub fn manager(&self) -> CacheManager {
        let git = SystemGit::new();
        let config = CacheConfig::resolve(&self.overrides(), &git);
        log::debug!("cache root: {}", config.root_dir.display());
        CacheManager::with_git(config, Box::new(git))
    }
}

/// `base` followed by `extra`.
pub(crate) fn join_args(base: &[String], extra: &[String]) -> Vec<String> {
    base.iter().chain(extra).cloned().collect()
}

/// Splits a leading positional value off pass-through git arguments.
///
/// The first value is the positional unless it starts with `-`. A `--`
/// right after it is dropped, so `URI DEST -- ARGS` and `URI DEST ARGS` mean
/// the same thing.
pub(crate) fn split_leading(values: &[String]) -> (Option<&str>, &[String]) {
    match values.split_first() {
        Some((first, rest)) if !first.starts_with('-') => {
            let rest = match rest.split_first() {
                Some((dashes, after)) if dashes == "--" => after,
                _ => rest,
            };
            (Some(first.as_str()), rest)
        }
        _ => (None, values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        global: GlobalArgs,
    }

    fn parse(args: &[&str]) -> GlobalArgs {
        TestCli::parse_from(std::iter::once("git-cache").chain(args.iter().copied())).global
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(parse(&[]).log_filter(), LevelFilter::Warn);
        assert_eq!(parse(&["-v"]).log_filter(), LevelFilter::Info);
        assert_eq!(parse(&["-vvvvvv"]).log_filter(), LevelFilter::Trace);
        assert_eq!(parse(&["-qqq"]).log_filter(), LevelFilter::Off);
        assert_eq!(
            parse(&["--log-level", "debug", "-q"]).log_filter(),
            LevelFilter::Info
        );
    }

    #[test]
    fn test_git_verbosity_args() {
        assert!(parse(&[]).git_verbosity_args().is_empty());
        assert_eq!(parse(&["-vv"]).git_verbosity_args(), vec!["--verbose", "--verbose"]);
        assert_eq!(parse(&["-q"]).git_verbosity_args(), vec!["--quiet"]);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        let global = parse(&[
            "--root-dir",
            "/tmp/cache",
            "--no-lock",
            "--timeout",
            "-1",
            "--clone-mode",
            "mirror",
            "--metadata-store",
            "json",
        ]);
        let overrides = global.overrides();
        assert_eq!(overrides.root_dir, Some(PathBuf::from("/tmp/cache")));
        assert!(overrides.no_lock);
        assert_eq!(overrides.lock_timeout, Some(-1));
        assert_eq!(overrides.clone_mode, Some(CloneMode::Mirror));
        assert_eq!(overrides.metadata_store, Some(MetadataStoreKind::Json));
    }

    #[test]
    #[serial]
    fn test_overrides_from_environment() {
        std::env::set_var("GIT_CACHE_LOCK_TIMEOUT", "0");
        std::env::set_var("GIT_CACHE_METADATA_STORE", "none");
        let from_env = parse(&[]).overrides();
        let from_flag = parse(&["--timeout", "30"]).overrides();
        std::env::remove_var("GIT_CACHE_LOCK_TIMEOUT");
        std::env::remove_var("GIT_CACHE_METADATA_STORE");

        assert_eq!(from_env.lock_timeout, Some(0));
        assert_eq!(from_env.metadata_store, Some(MetadataStoreKind::None));
        assert_eq!(from_flag.lock_timeout, Some(30));
    }

    #[test]
    fn test_split_leading() {
        let values = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let all = values(&["work", "--depth", "1"]);
        assert_eq!(split_leading(&all), (Some("work"), &all[1..]));

        let all = values(&["work", "--", "--depth", "1"]);
        assert_eq!(split_leading(&all), (Some("work"), &all[2..]));

        let all = values(&["--depth", "1"]);
        assert_eq!(split_leading(&all), (None, &all[..]));

        let none: Vec<String> = Vec::new();
        assert_eq!(split_leading(&none), (None, &none[..]));
    }

    #[test]
    fn test_join_args() {
        let base = vec!["--quiet".to_string()];
        let extra = vec!["--depth".to_string(), "1".to_string()];
        assert_eq!(join_args(&base, &extra), vec!["--quiet", "--depth", "1"]);
    }
}
