//! # Pod File Locks
//!
//! Advisory `flock`-style locks on a per-pod lock file, safe across processes
//! and across threads of one process (every acquisition opens its own file
//! description).
//!
//! The lock file can be deleted at any time by a concurrent `clean`. An
//! acquisition therefore re-checks the file's link count once the lock is
//! held: a lock on an unlinked file protects nothing, so it is dropped and
//! reported as [`LockError::Removed`]. A [`FileLock`] configured with
//! `retry_on_missing` recreates the file (and its parent directories) and
//! tries again, a bounded number of times.
//!
//! Waiting is bounded by a per-call deadline ([`LockWait`]), polled with
//! exponential backoff, so concurrent or nested waits in one process never
//! interfere with each other.
//!
//! ```no_run
//! use git_cache::lock::{FileLock, LockMode, LockWait};
//! use std::time::Duration;
//!
//! let guard = FileLock::new("/tmp/pod/repo.lock", LockMode::Exclusive)
//!     .wait(LockWait::Timeout(Duration::from_secs(5)))
//!     .acquire()?;
//! // ... mutate the pod ...
//! drop(guard);
//! # Ok::<(), git_cache::lock::LockError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

/// Default number of recreate-and-retry rounds for a removed lock file.
pub const DEFAULT_RETRY_COUNT: usize = 5;

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many concurrent holders; excludes `Exclusive`.
    Shared,
    /// Single holder; excludes everyone else.
    Exclusive,
}

/// How long an acquisition may wait for a contended lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// Try once and fail immediately if the lock is held.
    NonBlocking,
    /// Wait up to the given duration.
    Timeout(Duration),
    /// Wait until the lock becomes available.
    Forever,
}

impl LockWait {
    /// Map a timeout in seconds: `0` never waits, a negative value waits forever.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => LockWait::NonBlocking,
            s if s < 0 => LockWait::Forever,
            s => LockWait::Timeout(Duration::from_secs(s.unsigned_abs())),
        }
    }
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait::Forever
    }
}

/// Why a lock could not be acquired.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock file does not exist and the caller did not ask for it to be created.
    #[error("lock file {} does not exist", path.display())]
    Missing { path: PathBuf },

    /// The lock was still held by someone else when the deadline passed.
    #[error("timed out waiting for lock file {}", path.display())]
    WaitTimeout { path: PathBuf },

    /// The lock file was unlinked between opening it and locking it.
    #[error("lock file {} removed during lock acquisition", path.display())]
    Removed { path: PathBuf },

    /// Any other OS error while creating, opening or locking the file.
    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    /// Path of the lock file involved.
    pub fn path(&self) -> &Path {
        match self {
            LockError::Missing { path }
            | LockError::WaitTimeout { path }
            | LockError::Removed { path }
            | LockError::Io { path, .. } => path,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Builder for acquiring a lock on one lock file.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    mode: LockMode,
    wait: LockWait,
    retry_on_missing: bool,
    retry_count: usize,
    check_exists_on_release: bool,
}

impl FileLock {
    /// A lock on `path` in `mode` that waits forever and does not create the file.
    pub fn new(path: impl Into<PathBuf>, mode: LockMode) -> Self {
        Self {
            path: path.into(),
            mode,
            wait: LockWait::Forever,
            retry_on_missing: false,
            retry_count: DEFAULT_RETRY_COUNT,
            check_exists_on_release: true,
        }
    }

    /// Set how long to wait for a contended lock.
    pub fn wait(mut self, wait: LockWait) -> Self {
        self.wait = wait;
        self
    }

    /// Create a missing or removed lock file and retry, instead of failing.
    pub fn retry_on_missing(mut self, retry: bool) -> Self {
        self.retry_on_missing = retry;
        self
    }

    /// Maximum number of recreate-and-retry rounds.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = count;
        self
    }

    /// Warn on release if the lock file no longer exists.
    pub fn check_exists_on_release(mut self, check: bool) -> Self {
        self.check_exists_on_release = check;
        self
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock. The lock is held until the returned guard is dropped.
    pub fn acquire(&self) -> Result<LockGuard, LockError> {
        self.acquire_with(&mut |_| {})
    }

    /// Acquire, calling `before_lock` between opening and locking the file.
    pub(crate) fn acquire_with(
        &self,
        before_lock: &mut dyn FnMut(&Path),
    ) -> Result<LockGuard, LockError> {
        let file = if self.retry_on_missing {
            acquire_with_retries(
                &self.path,
                self.mode,
                self.wait,
                self.retry_count,
                before_lock,
            )?
        } else {
            acquire_once(&self.path, self.mode, self.wait, before_lock)?
        };

        Ok(LockGuard {
            file,
            path: self.path.clone(),
            check_exists_on_release: self.check_exists_on_release,
        })
    }
}

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    check_exists_on_release: bool,
}

impl LockGuard {
    /// Path of the locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Skip the existence check on release, for a holder that is about to
    /// delete the lock file itself.
    pub fn skip_release_check(&mut self) {
        self.check_exists_on_release = false;
    }

    /// Release the lock explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!("releasing lock {}", self.path.display());
        if self.check_exists_on_release && matches!(is_unlinked(&self.file), Ok(true)) {
            warn!(
                "lock file {} does not exist on lock release",
                self.path.display()
            );
        }
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Acquire a lock on an existing lock file.
///
/// Fails with [`LockError::Missing`] if the file does not exist and with
/// [`LockError::Removed`] if it was unlinked while the lock was being taken.
pub fn acquire_file_lock(path: &Path, mode: LockMode, wait: LockWait) -> Result<File, LockError> {
    acquire_once(path, mode, wait, &mut |_| {})
}

/// Like [`acquire_file_lock`], but creates the file and its parent
/// directories when it is missing or was removed, up to `retry_count` times.
///
/// Timeouts and other OS errors are returned immediately.
pub fn acquire_file_lock_with_retries(
    path: &Path,
    mode: LockMode,
    wait: LockWait,
    retry_count: usize,
) -> Result<File, LockError> {
    acquire_with_retries(path, mode, wait, retry_count, &mut |_| {})
}

/// Create the lock file if it does not exist.
///
/// Uses exclusive creation, so concurrent creators never truncate each
/// other's file.
pub fn make_lock_file(path: &Path) -> io::Result<()> {
    debug!("creating lock file {}", path.display());
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

fn create_lock_file_and_parents(path: &Path) -> Result<(), LockError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LockError::io(path, e))?;
    }
    make_lock_file(path).map_err(|e| LockError::io(path, e))
}

fn acquire_with_retries(
    path: &Path,
    mode: LockMode,
    wait: LockWait,
    retry_count: usize,
    before_lock: &mut dyn FnMut(&Path),
) -> Result<File, LockError> {
    let mut last_err = None;
    for _ in 0..=retry_count {
        match acquire_once(path, mode, wait, before_lock) {
            Ok(file) => return Ok(file),
            Err(err @ LockError::Removed { .. }) => {
                warn!("{}", err);
                create_lock_file_and_parents(path)?;
                last_err = Some(err);
            }
            Err(err @ LockError::Missing { .. }) => {
                create_lock_file_and_parents(path)?;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| LockError::Missing {
        path: path.to_path_buf(),
    }))
}

fn acquire_once(
    path: &Path,
    mode: LockMode,
    wait: LockWait,
    before_lock: &mut dyn FnMut(&Path),
) -> Result<File, LockError> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LockError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(LockError::io(path, e)),
    };

    debug!(
        "acquiring lock on {} (mode = {:?}, wait = {:?})",
        path.display(),
        mode,
        wait
    );
    before_lock(path);
    lock_file(&file, path, mode, wait)?;

    // A clean may have unlinked the file while we waited for the lock.
    if is_unlinked(&file).map_err(|e| LockError::io(path, e))? {
        let _ = fs2::FileExt::unlock(&file);
        return Err(LockError::Removed {
            path: path.to_path_buf(),
        });
    }

    Ok(file)
}

fn lock_file(file: &File, path: &Path, mode: LockMode, wait: LockWait) -> Result<(), LockError> {
    let deadline = match wait {
        LockWait::Forever => {
            let res = match mode {
                LockMode::Shared => fs2::FileExt::lock_shared(file),
                LockMode::Exclusive => fs2::FileExt::lock_exclusive(file),
            };
            return res.map_err(|e| LockError::io(path, e));
        }
        LockWait::NonBlocking => Instant::now(),
        LockWait::Timeout(timeout) => Instant::now() + timeout,
    };

    let mut backoff = MIN_BACKOFF;
    loop {
        let res = match mode {
            LockMode::Shared => fs2::FileExt::try_lock_shared(file),
            LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(file),
        };
        match res {
            Ok(()) => return Ok(()),
            Err(e) if is_contended(&e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(LockError::WaitTimeout {
                        path: path.to_path_buf(),
                    });
                }
                thread::sleep(backoff.min(deadline - now));
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(LockError::io(path, e)),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn is_unlinked(file: &File) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    Ok(file.metadata()?.nlink() == 0)
}

#[cfg(not(unix))]
fn is_unlinked(_file: &File) -> io::Result<bool> {
    Ok(false)
}
