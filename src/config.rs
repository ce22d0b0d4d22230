//! # Configuration
//!
//! [`CacheConfig`] is a plain value built once by the binary and handed to
//! [`CacheManager::new`](crate::manager::CacheManager::new). Nothing in the
//! library reads configuration from global state.
//!
//! Each setting is resolved from, highest priority first:
//!
//! 1. a command-line flag or its environment variable ([`ConfigOverrides`])
//! 2. a `gitcache.*` key in git config
//! 3. the built-in default from [`crate::defaults`]
//!
//! | Setting | git config key |
//! |---|---|
//! | root directory | `gitcache.rootdir` |
//! | locking enabled | `gitcache.uselock` |
//! | lock timeout (seconds) | `gitcache.locktimeout` |
//! | clone mode | `gitcache.clonemode` |
//! | metadata store | `gitcache.metadatastore` |
//!
//! Git config values that cannot be parsed are logged and ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::git::{CloneMode, GitOperations};
use crate::lock::LockWait;

pub const KEY_ROOT_DIR: &str = "gitcache.rootdir";
pub const KEY_USE_LOCK: &str = "gitcache.uselock";
pub const KEY_LOCK_TIMEOUT: &str = "gitcache.locktimeout";
pub const KEY_CLONE_MODE: &str = "gitcache.clonemode";
pub const KEY_METADATA_STORE: &str = "gitcache.metadatastore";

/// Where usage metadata is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStoreKind {
    /// Events are dropped.
    None,
    /// `<root>/metadata.json`
    Json,
    /// `<root>/metadata.db`
    Sqlite,
}

impl Default for MetadataStoreKind {
    fn default() -> Self {
        defaults::DEFAULT_METADATA_STORE
    }
}

impl fmt::Display for MetadataStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetadataStoreKind::None => "none",
            MetadataStoreKind::Json => "json",
            MetadataStoreKind::Sqlite => "sqlite",
        })
    }
}

impl FromStr for MetadataStoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(MetadataStoreKind::None),
            "json" => Ok(MetadataStoreKind::Json),
            "sqlite" | "db" => Ok(MetadataStoreKind::Sqlite),
            other => Err(Error::InvalidArgument {
                message: format!(
                    "unknown metadata store '{}' (expected none, json or sqlite)",
                    other
                ),
            }),
        }
    }
}

/// Fully resolved cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root directory holding `repos/` and the metadata store.
    pub root_dir: PathBuf,
    /// Take pod locks. Disabling this is unsafe with concurrent invocations.
    pub use_lock: bool,
    /// How long pod lock acquisition may wait.
    pub lock_wait: LockWait,
    /// How cached clones are created.
    pub clone_mode: CloneMode,
    /// Where usage metadata is persisted.
    pub metadata_store: MetadataStoreKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(defaults::default_root_dir())
    }
}

impl CacheConfig {
    /// Defaults for everything but the root directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            use_lock: defaults::DEFAULT_USE_LOCK,
            lock_wait: LockWait::from_secs(defaults::DEFAULT_LOCK_TIMEOUT_SECS),
            clone_mode: defaults::DEFAULT_CLONE_MODE,
            metadata_store: MetadataStoreKind::default(),
        }
    }

    pub fn with_use_lock(mut self, use_lock: bool) -> Self {
        self.use_lock = use_lock;
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: LockWait) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn with_clone_mode(mut self, clone_mode: CloneMode) -> Self {
        self.clone_mode = clone_mode;
        self
    }

    pub fn with_metadata_store(mut self, metadata_store: MetadataStoreKind) -> Self {
        self.metadata_store = metadata_store;
        self
    }

    /// Resolve every setting from overrides, git config and defaults.
    pub fn resolve(overrides: &ConfigOverrides, git: &dyn GitOperations) -> Self {
        let root_dir = match &overrides.root_dir {
            Some(dir) => dir.clone(),
            None => git_config(git, KEY_ROOT_DIR)
                .map(|value| expand_home(&value))
                .unwrap_or_else(defaults::default_root_dir),
        };

        let use_lock = if overrides.no_lock {
            false
        } else {
            git_config(git, KEY_USE_LOCK)
                .map(|value| parse_bool(&value))
                .unwrap_or(defaults::DEFAULT_USE_LOCK)
        };

        let timeout = overrides
            .lock_timeout
            .or_else(|| git_config_parsed(git, KEY_LOCK_TIMEOUT))
            .unwrap_or(defaults::DEFAULT_LOCK_TIMEOUT_SECS);

        let clone_mode = overrides
            .clone_mode
            .or_else(|| git_config_parsed(git, KEY_CLONE_MODE))
            .unwrap_or(defaults::DEFAULT_CLONE_MODE);

        let metadata_store = overrides
            .metadata_store
            .or_else(|| git_config_parsed(git, KEY_METADATA_STORE))
            .unwrap_or_default();

        Self {
            root_dir,
            use_lock,
            lock_wait: LockWait::from_secs(timeout),
            clone_mode,
            metadata_store,
        }
    }
}

/// Settings given explicitly on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub root_dir: Option<PathBuf>,
    pub no_lock: bool,
    pub lock_timeout: Option<i64>,
    pub clone_mode: Option<CloneMode>,
    pub metadata_store: Option<MetadataStoreKind>,
}

fn git_config(git: &dyn GitOperations, key: &str) -> Option<String> {
    match git.config_get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("could not read git config {}: {}", key, e);
            None
        }
    }
}

fn git_config_parsed<T>(git: &dyn GitOperations, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = git_config(git, key)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("ignoring git config {} = {:?}: {}", key, value, e);
            None
        }
    }
}

/// `true`, `1`, `y` and `yes` (any case) are true; everything else is false.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "y" | "yes"
    )
}

fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => Path::new(value).to_path_buf(),
    }
}
