//! # Error Handling
//!
//! This module defines the centralized error type for the `git-cache`
//! library. It uses the `thiserror` library to build a single `Error` enum
//! whose variants map one-to-one onto the failure modes of the pod lifecycle.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries enough context (the URI,
//!   the lock path, the git command) to produce a useful message on its own.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Recoverable vs. fatal
//!
//! Several variants describe expected conditions rather than faults:
//!
//! - `RepoAlreadyExists`: the caller decides whether this counts as success.
//! - `RepoNotFound`: recoverable with `allow_create` or an uncached fallback.
//! - `LockWaitTimeout`: the cache is busy; callers skip it or fall back.
//! - `GitCommandFailed`: any partial pod state is rolled back before this is
//!   returned; composite operations may fall back.
//!
//! `LockFailed`, `Io` and an incompatible metadata schema are the truly
//! exceptional cases. `Db` errors only ever come out of metadata reads; the
//! metadata commit path logs them instead of returning them.
//!
//! Use [`Error::is_recoverable`] and [`Error::triggers_fallback`] instead of
//! matching on variants when only the category matters.

use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;

/// Main error type for git-cache operations
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied an argument that cannot be acted on.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The pod for this URI is already populated.
    #[error("Repository {uri} is already cached")]
    RepoAlreadyExists { uri: String },

    /// The pod for this URI is not populated.
    #[error("Repository {uri} is not cached")]
    RepoNotFound { uri: String },

    /// An OS-level error occurred while creating, opening or locking a lock file.
    #[error("Failed to lock {}: {source}", path.display())]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lock could not be acquired before the configured deadline.
    #[error("Timed out waiting for lock {}", path.display())]
    LockWaitTimeout { path: PathBuf },

    /// A git subprocess exited unsuccessfully, or could not be spawned.
    #[error("Git command failed: {command}{}", code.map(|c| format!(" (exit code {})", c)).unwrap_or_default())]
    GitCommandFailed { command: String, code: Option<i32> },

    /// A metadata store operation failed.
    #[error("Metadata store error: {message}")]
    Db { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the condition is expected and the caller may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RepoAlreadyExists { .. }
                | Error::RepoNotFound { .. }
                | Error::LockWaitTimeout { .. }
                | Error::GitCommandFailed { .. }
        )
    }

    /// Whether a composite clone should retry without the cache.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Error::RepoNotFound { .. }
                | Error::LockWaitTimeout { .. }
                | Error::GitCommandFailed { .. }
        )
    }

    pub(crate) fn db(message: impl Into<String>) -> Self {
        Error::Db {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::db(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::db(err.to_string())
    }
}

/// Lock failures as seen by a writer: only a timeout is an expected condition.
///
/// Readers map `Missing` and `Removed` to [`Error::RepoNotFound`] themselves.
impl From<LockError> for Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::WaitTimeout { path } => Error::LockWaitTimeout { path },
            LockError::Io { path, source } => Error::LockFailed { path, source },
            LockError::Missing { ref path } | LockError::Removed { ref path } => {
                Error::LockFailed {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, err.to_string()),
                }
            }
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
