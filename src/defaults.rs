//! Default values for git-cache configuration.
//!
//! This module provides centralized default values used by the config
//! resolution and the command-line layer.

use std::path::PathBuf;

use crate::config::MetadataStoreKind;
use crate::git::CloneMode;

/// Lock wait in seconds; negative waits forever.
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = -1;

/// Locking is on unless explicitly disabled.
pub const DEFAULT_USE_LOCK: bool = true;

pub const DEFAULT_CLONE_MODE: CloneMode = CloneMode::Bare;

pub const DEFAULT_METADATA_STORE: MetadataStoreKind = MetadataStoreKind::Sqlite;

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/git-cache` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/git-cache`
/// - Windows: `{FOLDERID_RoamingAppData}\git-cache`
///
/// Falls back to `.git-cache` in the current directory if the platform data
/// directory cannot be determined.
///
/// This can be overridden by the `--root-dir` CLI flag, the
/// `GIT_CACHE_ROOT_DIR` environment variable or the `gitcache.rootdir` git
/// config key.
pub fn default_root_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("git-cache"))
        .unwrap_or_else(|| PathBuf::from(".git-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_dir_returns_path() {
        let root = default_root_dir();
        assert!(root.ends_with("git-cache") || root.ends_with(".git-cache"));
    }

    #[test]
    fn test_default_root_dir_is_absolute_or_fallback() {
        let root = default_root_dir();
        assert!(
            root.is_absolute() || root.starts_with(".git-cache"),
            "Expected absolute path or fallback, got: {:?}",
            root
        );
    }
}
