//! # Git Cache Library
//!
//! This library keeps a local, disk-backed cache of git clones and uses them
//! as `--reference` sources for new clones, so repeated clones of the same
//! remote only download the objects the cache does not have yet. It is
//! designed to be used by the `git-cache` command-line tool but can also be
//! embedded in other tools that clone many repositories.
//!
//! ## Quick Example
//!
//! ```
//! use git_cache::pod::Pod;
//! use git_cache::uri;
//! use std::path::Path;
//!
//! // Every spelling of a remote maps to the same cache key
//! let https = uri::normalize("https://github.com/rust-lang/cargo.git").unwrap();
//! let ssh = uri::normalize("git@github.com:rust-lang/cargo").unwrap();
//! assert_eq!(https, ssh);
//! assert_eq!(https.as_str(), "github.com/rust-lang/cargo");
//!
//! // ...and to one pod directory under the cache root
//! let pod = Pod::new(Path::new("/var/cache/git"), &https);
//! assert!(pod.pod_dir().ends_with("repos/github.com_rust-lang_cargo"));
//! assert!(pod.repo_dir().ends_with("git"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Cache keys (`uri`)**: Remote addresses are normalized so that `https`,
//!   `ssh` and scp-style spellings of one repository share a pod.
//! - **Pods (`pod`)**: One directory per cached repository, holding the bare
//!   or mirror clone, a lock file and a last-used marker.
//! - **Locks (`lock`)**: Advisory file locks with bounded waits that coordinate
//!   concurrent `git-cache` processes on the same pod. Readers share a pod;
//!   writers and `clean` take it exclusively.
//! - **Lifecycle (`manager`)**: Adds, refreshes, reference clones and cleans
//!   pods, rolling back failed clones and falling back to a plain clone when
//!   the cache cannot be used.
//! - **Metadata (`metadata`)**: Usage statistics per repository, kept in
//!   SQLite or JSON and updated once per command.
//! - **Configuration (`config`, `defaults`)**: Command-line flags and
//!   environment variables, then `gitcache.*` git config keys, then built-in
//!   defaults.

pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod lock;
pub mod manager;
pub mod metadata;
pub mod pod;
pub mod uri;

#[cfg(test)]
mod uri_proptest;
