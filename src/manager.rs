//! # Pod Lifecycle Manager
//!
//! `CacheManager` drives every state transition of a pod:
//!
//! ```text
//! ABSENT --add--> PRESENT --refresh--> PRESENT --clean--> ABSENT
//! ```
//!
//! ## Locking
//!
//! Each operation takes the pod lock in the mode it needs and holds it for
//! the whole git call:
//!
//! | Operation | Mode | Missing lock file |
//! |---|---|---|
//! | `add` | exclusive | created |
//! | `refresh` | exclusive | created |
//! | `clean` | exclusive | created (the pod is removed anyway) |
//! | `reference_clone` | shared | `RepoNotFound`, never created |
//!
//! Writers re-check the pod state once they hold the lock, since another
//! process may have populated or removed it while they waited. The composite
//! [`CacheManager::clone`] takes and releases each stage's lock separately and
//! never holds locks on two pods at once.
//!
//! ## Rollback
//!
//! A failed clone into a pod deletes the whole pod before the error is
//! returned, so a later `add` never mistakes a half-populated pod for a cached
//! one.
//!
//! ## Metadata
//!
//! Operations buffer [`Event`]s in memory. [`CacheManager::commit_metadata`]
//! writes them to the configured store and logs, rather than returns, any
//! failure.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::git::{is_prune_requested, GitOperations, SystemGit};
use crate::lock::{make_lock_file, FileLock, LockError, LockGuard, LockMode};
use crate::metadata::{Event, EventBuffer, Metadata, RepoRecord};
use crate::pod::{self, Pod};
use crate::uri::{normalize, NormalizedUri};

/// Options for the composite [`CacheManager::clone`].
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Destination directory; git picks one from the URI when `None`.
    pub dest: Option<PathBuf>,
    /// Pass `--dissociate` to the reference clone.
    pub dissociate: bool,
    /// Populate the pod first if it is not cached yet.
    pub add: bool,
    /// Fetch into an existing pod before cloning from it.
    pub refresh: bool,
    /// Fall back to an uncached clone if the cached path fails.
    pub fallback: bool,
    /// Extra arguments for the reference clone (and the fallback clone).
    pub clone_args: Vec<String>,
    /// Extra arguments for the add and refresh stages.
    pub cache_args: Vec<String>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            dest: None,
            dissociate: false,
            add: true,
            refresh: false,
            fallback: true,
            clone_args: Vec::new(),
            cache_args: Vec::new(),
        }
    }
}

/// How a composite clone was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// Reference clone from the pod.
    Cached,
    /// Plain clone after the cached path failed.
    Uncached,
}

/// Result of an operation applied to every pod.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    /// Pods the operation acted on.
    pub processed: usize,
    /// Pods left alone (unpopulated, recently used, ...).
    pub skipped: usize,
    /// Pods the operation failed on.
    pub failures: Vec<(PathBuf, Error)>,
}

impl BulkOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What is known about one repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoInfo {
    pub normalized_uri: String,
    /// Whether the pod currently holds a clone.
    pub cached: bool,
    pub pod_dir: PathBuf,
    /// Usage metadata, if any has been recorded.
    pub record: Option<RepoRecord>,
}

/// Orchestrates add / refresh / reference clone / clean on pods.
pub struct CacheManager {
    config: CacheConfig,
    git: Box<dyn GitOperations>,
    metadata: Metadata,
    events: EventBuffer,
}

impl CacheManager {
    /// A manager running the system `git`.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_git(config, Box::new(SystemGit::new()))
    }

    /// A manager running git through `git`.
    pub fn with_git(config: CacheConfig, git: Box<dyn GitOperations>) -> Self {
        let metadata = Metadata::new(&config.root_dir, config.metadata_store);
        Self {
            config,
            git,
            metadata,
            events: EventBuffer::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Events recorded since the last commit.
    pub fn pending_events(&self) -> &EventBuffer {
        &self.events
    }

    /// The pod for `key` under the configured root.
    pub fn pod(&self, key: &NormalizedUri) -> Pod {
        Pod::new(&self.config.root_dir, key)
    }

    /// Clone `uri` into its pod.
    ///
    /// Returns [`Error::RepoAlreadyExists`] without touching anything if the
    /// pod is already populated, unless `refresh_if_exists` is set, in which
    /// case the pod is fetched instead.
    pub fn add(&mut self, uri: &str, clone_args: &[String], refresh_if_exists: bool) -> Result<()> {
        let key = normalize(uri)?;
        let pod = self.pod(&key);
        debug!("adding {} to cache at {}", uri, pod.pod_dir().display());

        if pod.is_populated() {
            return self.already_cached(&key, refresh_if_exists);
        }

        fs::create_dir_all(pod.pod_dir())?;
        let mut guard = if self.config.use_lock {
            make_lock_file(pod.lock_file_path()).map_err(|source| Error::LockFailed {
                path: pod.lock_file_path().to_path_buf(),
                source,
            })?;
            Some(self.writer_lock(&pod).acquire()?)
        } else {
            None
        };

        // Another process may have populated the pod while we waited.
        if pod.is_populated() {
            if refresh_if_exists {
                return self.fetch_locked(&key, &pod, &[]);
            }
            return Err(Error::RepoAlreadyExists {
                uri: key.to_string(),
            });
        }

        self.clone_locked(uri, &key, &pod, clone_args, &mut guard)
    }

    fn already_cached(&mut self, key: &NormalizedUri, refresh: bool) -> Result<()> {
        if refresh {
            debug!("{} already cached, refreshing", key);
            return self.refresh(key.as_str(), &[], false);
        }
        debug!("{} already cached", key);
        Err(Error::RepoAlreadyExists {
            uri: key.to_string(),
        })
    }

    /// Fetch into the pod for `uri`.
    ///
    /// An unpopulated pod is [`Error::RepoNotFound`] unless `allow_create` is
    /// set, in which case it is cloned under the same lock.
    pub fn refresh(&mut self, uri: &str, fetch_args: &[String], allow_create: bool) -> Result<()> {
        let key = normalize(uri)?;
        let pod = self.pod(&key);
        debug!("refreshing {}", pod.repo_dir().display());

        if !pod.is_populated() && !allow_create {
            return Err(Error::RepoNotFound {
                uri: key.to_string(),
            });
        }

        let mut guard = if self.config.use_lock {
            Some(self.writer_lock(&pod).acquire()?)
        } else {
            fs::create_dir_all(pod.pod_dir())?;
            None
        };

        if !pod.is_populated() {
            if !allow_create {
                // Removed while we waited; drop the lock file we recreated.
                discard_pod(&pod, &mut guard);
                return Err(Error::RepoNotFound {
                    uri: key.to_string(),
                });
            }
            return self.clone_locked(uri, &key, &pod, &[], &mut guard);
        }

        self.fetch_locked(&key, &pod, fetch_args)
    }

    /// Fetch into every populated pod.
    pub fn refresh_all(&mut self, fetch_args: &[String]) -> Result<BulkOutcome> {
        debug!("refreshing all cached repos");
        let mut outcome = BulkOutcome::default();
        for pod in pod::list_pods(&self.config.root_dir)? {
            if !pod.is_populated() {
                outcome.skipped += 1;
                continue;
            }
            let key = self.key_for_pod(&pod);
            match self.refresh_pod(key.as_ref(), &pod, fetch_args) {
                Ok(()) => outcome.processed += 1,
                Err(e) => {
                    warn!("failed to refresh {}: {}", pod.pod_dir().display(), e);
                    outcome.failures.push((pod.pod_dir().to_path_buf(), e));
                }
            }
        }
        Ok(outcome)
    }

    fn refresh_pod(
        &mut self,
        key: Option<&NormalizedUri>,
        pod: &Pod,
        fetch_args: &[String],
    ) -> Result<()> {
        let mut guard = if self.config.use_lock {
            Some(self.writer_lock(pod).acquire()?)
        } else {
            None
        };
        if !pod.is_populated() {
            discard_pod(pod, &mut guard);
            return Err(Error::RepoNotFound {
                uri: pod.pod_dir().display().to_string(),
            });
        }
        self.git.fetch(pod.repo_dir(), fetch_args)?;
        if let Some(key) = key {
            self.record_fetch(key, pod, fetch_args);
        }
        Ok(())
    }

    /// Clone `uri` into `dest` using its pod as `--reference`.
    ///
    /// Never creates the pod or its lock file: a pod that is not populated,
    /// or whose lock file disappears, is [`Error::RepoNotFound`].
    pub fn reference_clone(
        &mut self,
        uri: &str,
        dest: Option<&Path>,
        dissociate: bool,
        clone_args: &[String],
    ) -> Result<()> {
        let key = normalize(uri)?;
        let pod = self.pod(&key);
        debug!("cache clone using repository at {}", pod.repo_dir().display());

        let not_found = || Error::RepoNotFound {
            uri: key.to_string(),
        };
        if !pod.is_populated() {
            return Err(not_found());
        }

        let _guard = if self.config.use_lock {
            let lock = FileLock::new(pod.lock_file_path(), LockMode::Shared)
                .wait(self.config.lock_wait)
                .retry_on_missing(false);
            match lock.acquire() {
                Ok(guard) => Some(guard),
                Err(LockError::Missing { .. }) | Err(LockError::Removed { .. }) => {
                    return Err(not_found())
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        if !pod.is_populated() {
            return Err(not_found());
        }

        if let Err(e) = pod.touch_last_used() {
            warn!(
                "could not update {}: {}",
                pod.last_used_marker_path().display(),
                e
            );
        }

        let start = Instant::now();
        self.git
            .reference_clone(uri, pod.repo_dir(), dest, dissociate, clone_args)?;
        let dependent = if dissociate {
            None
        } else {
            clone_destination(&key, dest)
        };
        self.events
            .push(&key, Event::used(start.elapsed().as_secs_f64(), dependent));
        Ok(())
    }

    /// Remove the pod for `uri`.
    ///
    /// With `unused_for_days`, a pod whose last-used marker is younger than
    /// that many days is kept. Returns whether a populated pod was removed.
    pub fn clean(&mut self, uri: &str, unused_for_days: Option<u64>) -> Result<bool> {
        let key = normalize(uri)?;
        let pod = self.pod(&key);
        if !pod.exists() {
            info!("repo {} not cached", key);
            return Ok(false);
        }
        self.clean_pod(Some(&key), &pod, unused_for_days)
    }

    /// Remove every pod, subject to `unused_for_days`.
    pub fn clean_all(&mut self, unused_for_days: Option<u64>) -> Result<BulkOutcome> {
        debug!("cleaning all cached repos");
        let mut outcome = BulkOutcome::default();
        for pod in pod::list_pods(&self.config.root_dir)? {
            let key = self.key_for_pod(&pod);
            match self.clean_pod(key.as_ref(), &pod, unused_for_days) {
                Ok(true) => outcome.processed += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    warn!("failed to clean {}: {}", pod.pod_dir().display(), e);
                    outcome.failures.push((pod.pod_dir().to_path_buf(), e));
                }
            }
        }
        Ok(outcome)
    }

    fn clean_pod(
        &mut self,
        key: Option<&NormalizedUri>,
        pod: &Pod,
        unused_for_days: Option<u64>,
    ) -> Result<bool> {
        let recently_used = |pod: &Pod| unused_for_days.is_some_and(|days| pod.was_used_within(days));

        if !pod.exists() || recently_used(pod) {
            debug!("keeping {}", pod.pod_dir().display());
            return Ok(false);
        }

        let _guard = if self.config.use_lock {
            let lock = self.writer_lock(pod).check_exists_on_release(false);
            Some(lock.acquire()?)
        } else {
            None
        };

        if !pod.exists() || recently_used(pod) {
            debug!("keeping {}", pod.pod_dir().display());
            return Ok(false);
        }

        let was_populated = pod.is_populated();
        if was_populated {
            if let Some(key) = key {
                self.warn_about_dependents(key);
            }
        }

        pod.remove_from_disk()?;
        if !was_populated {
            return Ok(false);
        }

        info!("removed {}", pod.pod_dir().display());
        if let Some(key) = key {
            self.events.push(key, Event::remove());
        }
        Ok(true)
    }

    /// Add (optionally), refresh (optionally), then reference clone, falling
    /// back to an uncached clone when allowed.
    pub fn clone(&mut self, uri: &str, options: &CloneOptions) -> Result<CloneOutcome> {
        match self.clone_via_cache(uri, options) {
            Ok(()) => Ok(CloneOutcome::Cached),
            Err(e) if options.fallback && e.triggers_fallback() => {
                warn!("cache clone failed ({}), trying normal clone", e);
                self.git
                    .clone_uncached(uri, options.dest.as_deref(), &options.clone_args)?;
                Ok(CloneOutcome::Uncached)
            }
            Err(e) => Err(e),
        }
    }

    fn clone_via_cache(&mut self, uri: &str, options: &CloneOptions) -> Result<()> {
        let mut just_added = false;
        if options.add {
            match self.add(uri, &options.cache_args, false) {
                Ok(()) => just_added = true,
                Err(Error::RepoAlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if options.refresh && !just_added {
            self.refresh(uri, &options.cache_args, false)?;
        }

        self.reference_clone(
            uri,
            options.dest.as_deref(),
            options.dissociate,
            &options.clone_args,
        )
    }

    /// Cache state and recorded metadata for `uri`.
    pub fn info(&self, uri: &str) -> Result<RepoInfo> {
        let key = normalize(uri)?;
        let record = self.metadata.record(&key)?;
        Ok(self.repo_info(&key, record))
    }

    /// Cache state and metadata of every recorded repository.
    pub fn info_all(&self) -> Result<Vec<RepoInfo>> {
        let mut infos = Vec::new();
        for record in self.metadata.records()? {
            match normalize(&record.normalized_uri) {
                Ok(key) => infos.push(self.repo_info(&key, Some(record))),
                Err(e) => warn!("skipping metadata record: {}", e),
            }
        }
        Ok(infos)
    }

    fn repo_info(&self, key: &NormalizedUri, record: Option<RepoRecord>) -> RepoInfo {
        let pod = self.pod(key);
        RepoInfo {
            normalized_uri: key.to_string(),
            cached: pod.is_populated(),
            pod_dir: pod.pod_dir().to_path_buf(),
            record,
        }
    }

    /// Write buffered events to the metadata store. Failures are logged.
    pub fn commit_metadata(&mut self) {
        if self.events.is_empty() {
            return;
        }
        self.metadata.commit_or_warn(&self.events);
        self.events.clear();
    }

    fn writer_lock(&self, pod: &Pod) -> FileLock {
        FileLock::new(pod.lock_file_path(), LockMode::Exclusive)
            .wait(self.config.lock_wait)
            .retry_on_missing(true)
    }

    /// Clone into the pod, which the caller has locked. Rolls back on failure.
    fn clone_locked(
        &mut self,
        uri: &str,
        key: &NormalizedUri,
        pod: &Pod,
        clone_args: &[String],
        guard: &mut Option<LockGuard>,
    ) -> Result<()> {
        let start = Instant::now();
        if let Err(e) =
            self.git
                .clone_into_pod(uri, pod.repo_dir(), self.config.clone_mode, clone_args)
        {
            debug!("clone failed, cleaning up {}", pod.pod_dir().display());
            discard_pod(pod, guard);
            return Err(e);
        }

        let clone_time = start.elapsed().as_secs_f64();
        info!("added {} to cache", key);
        self.events.push(
            key,
            Event::add(pod.repo_dir(), clone_time, pod.disk_usage_kb()),
        );
        Ok(())
    }

    /// Fetch into the pod, which the caller has locked.
    fn fetch_locked(&mut self, key: &NormalizedUri, pod: &Pod, fetch_args: &[String]) -> Result<()> {
        self.git.fetch(pod.repo_dir(), fetch_args)?;
        self.record_fetch(key, pod, fetch_args);
        Ok(())
    }

    fn record_fetch(&mut self, key: &NormalizedUri, pod: &Pod, fetch_args: &[String]) {
        self.events.push(
            key,
            Event::fetch(pod.disk_usage_kb(), is_prune_requested(fetch_args)),
        );
    }

    /// The cache key of a pod found on disk, from its clone's remote URL.
    fn key_for_pod(&self, pod: &Pod) -> Option<NormalizedUri> {
        if !pod.is_populated() {
            return None;
        }
        let url = match self.git.remote_url(pod.repo_dir()) {
            Ok(Some(url)) => url,
            Ok(None) => return None,
            Err(e) => {
                debug!("no remote url for {}: {}", pod.repo_dir().display(), e);
                return None;
            }
        };
        let key = normalize(&url).ok()?;
        if self.pod(&key) == *pod {
            Some(key)
        } else {
            debug!(
                "remote {} does not match pod {}",
                url,
                pod.pod_dir().display()
            );
            None
        }
    }

    fn warn_about_dependents(&self, key: &NormalizedUri) {
        let record = match self.metadata.record(key) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                debug!("could not read metadata for {}: {}", key, e);
                return;
            }
        };
        let dependents: Vec<String> = record
            .potential_dependents
            .iter()
            .filter(|path| path.exists())
            .map(|path| path.display().to_string())
            .collect();
        if !dependents.is_empty() {
            warn!(
                "removing {} which may still be referenced by: {}",
                key,
                dependents.join(", ")
            );
        }
    }
}

/// Absolute path of a reference clone's working tree.
///
/// Without an explicit destination, git names the directory after the last
/// path segment of the repository.
fn clone_destination(key: &NormalizedUri, dest: Option<&Path>) -> Option<PathBuf> {
    let dest = match dest {
        Some(dest) => dest.to_path_buf(),
        None => PathBuf::from(key.as_str().rsplit('/').next()?),
    };
    std::path::absolute(dest).ok()
}

/// Delete a locked pod that holds no usable clone.
fn discard_pod(pod: &Pod, guard: &mut Option<LockGuard>) {
    if let Some(guard) = guard.as_mut() {
        guard.skip_release_check();
    }
    if let Err(e) = pod.remove_from_disk() {
        warn!("failed to remove {}: {}", pod.pod_dir().display(), e);
    }
}
