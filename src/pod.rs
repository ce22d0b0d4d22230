//! On-disk layout of a cached repository ("pod").
//!
//! ```text
//! <root>/repos/<flatten(key)>/
//!     git/              cached clone (bare or mirror)
//!     repo.lock         pod lock file, created lazily
//!     .git-cache-used   mtime = last reference clone
//! ```
//!
//! `git/` exists if and only if the pod is populated. Removal deletes `git/`
//! first and the rest of the pod second, so a concurrent reader sees either a
//! populated pod or an unpopulated one, never a half-deleted clone.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::debug;
use walkdir::WalkDir;

use crate::uri::NormalizedUri;

/// Directory under the cache root holding all pods.
pub const REPOS_DIR: &str = "repos";
/// Name of the clone directory inside a pod.
pub const REPO_DIR: &str = "git";
/// Name of the pod lock file.
pub const LOCK_FILE: &str = "repo.lock";
/// Name of the last-used marker file.
pub const LAST_USED_MARKER: &str = ".git-cache-used";

const SECONDS_PER_DAY: u64 = 86_400;

/// Paths of one pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pod {
    pod_dir: PathBuf,
    repo_dir: PathBuf,
    lock_file_path: PathBuf,
    last_used_marker_path: PathBuf,
}

impl Pod {
    /// The pod for `key` under cache root `root`.
    pub fn new(root: &Path, key: &NormalizedUri) -> Self {
        Self::from_dir(repos_dir(root).join(key.flatten()))
    }

    /// The pod rooted at an existing pod directory.
    pub fn from_dir(pod_dir: impl Into<PathBuf>) -> Self {
        let pod_dir = pod_dir.into();
        Self {
            repo_dir: pod_dir.join(REPO_DIR),
            lock_file_path: pod_dir.join(LOCK_FILE),
            last_used_marker_path: pod_dir.join(LAST_USED_MARKER),
            pod_dir,
        }
    }

    pub fn pod_dir(&self) -> &Path {
        &self.pod_dir
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn lock_file_path(&self) -> &Path {
        &self.lock_file_path
    }

    pub fn last_used_marker_path(&self) -> &Path {
        &self.last_used_marker_path
    }

    /// Whether the pod holds a clone.
    pub fn is_populated(&self) -> bool {
        self.repo_dir.exists()
    }

    /// Whether any part of the pod exists on disk.
    pub fn exists(&self) -> bool {
        self.pod_dir.is_dir()
    }

    /// Set the last-used marker's mtime to now, creating it if needed.
    pub fn touch_last_used(&self) -> io::Result<()> {
        let marker = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.last_used_marker_path)?;
        marker.set_modified(SystemTime::now())
    }

    /// Time of the last reference clone, if the marker exists.
    pub fn last_used(&self) -> Option<SystemTime> {
        fs::metadata(&self.last_used_marker_path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// Whether the pod was used within the last `days` days.
    ///
    /// A pod with no marker counts as stale.
    pub fn was_used_within(&self, days: u64) -> bool {
        let Some(last_used) = self.last_used() else {
            return false;
        };
        let window = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
        match SystemTime::now().duration_since(last_used) {
            Ok(age) => age < window,
            // Marker in the future: treat as just used.
            Err(_) => true,
        }
    }

    /// Delete the pod: the clone directory first, then everything else.
    ///
    /// Parts that are already gone are not an error.
    pub fn remove_from_disk(&self) -> io::Result<()> {
        debug!("removing {}", self.repo_dir.display());
        remove_dir_all_if_exists(&self.repo_dir)?;
        debug!("removing {}", self.pod_dir.display());
        remove_dir_all_if_exists(&self.pod_dir)
    }

    /// Size of the clone directory in KiB.
    pub fn disk_usage_kb(&self) -> u64 {
        let bytes: u64 = WalkDir::new(&self.repo_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum();
        bytes / 1024
    }
}

/// `<root>/repos`.
pub fn repos_dir(root: &Path) -> PathBuf {
    root.join(REPOS_DIR)
}

/// Every pod directory under `root`, sorted by name.
///
/// A missing `repos/` directory yields an empty list.
pub fn list_pods(root: &Path) -> io::Result<Vec<Pod>> {
    let dir = repos_dir(root);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs.into_iter().map(Pod::from_dir).collect())
}

fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uri::normalize;
    use tempfile::TempDir;

    fn pod_in(temp: &TempDir, uri: &str) -> Pod {
        Pod::new(temp.path(), &normalize(uri).unwrap())
    }

    #[test]
    fn test_layout() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "git@github.com:user/repo.git");
        let pod_dir = temp.path().join("repos").join("github.com_user_repo");
        assert_eq!(pod.pod_dir(), pod_dir);
        assert_eq!(pod.repo_dir(), pod_dir.join("git"));
        assert_eq!(pod.lock_file_path(), pod_dir.join("repo.lock"));
        assert_eq!(pod.last_used_marker_path(), pod_dir.join(".git-cache-used"));
    }

    #[test]
    fn test_equivalent_uris_share_a_pod() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            pod_in(&temp, "git@h.com:a/B.git"),
            pod_in(&temp, "https://H.com/a/B/")
        );
    }

    #[test]
    fn test_populated() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "https://h.com/a/b");
        assert!(!pod.exists());
        assert!(!pod.is_populated());

        fs::create_dir_all(pod.pod_dir()).unwrap();
        assert!(pod.exists());
        assert!(!pod.is_populated());

        fs::create_dir_all(pod.repo_dir()).unwrap();
        assert!(pod.is_populated());
    }

    #[test]
    fn test_marker_touch_and_age() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "https://h.com/a/b");
        fs::create_dir_all(pod.pod_dir()).unwrap();

        assert!(pod.last_used().is_none());
        assert!(!pod.was_used_within(30));

        pod.touch_last_used().unwrap();
        assert!(pod.last_used().is_some());
        assert!(pod.was_used_within(1));
        assert!(!pod.was_used_within(0));
    }

    #[test]
    fn test_old_marker_is_stale() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "https://h.com/a/b");
        fs::create_dir_all(pod.pod_dir()).unwrap();
        pod.touch_last_used().unwrap();

        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * SECONDS_PER_DAY);
        File::options()
            .write(true)
            .open(pod.last_used_marker_path())
            .unwrap()
            .set_modified(ten_days_ago)
            .unwrap();

        assert!(!pod.was_used_within(5));
        assert!(pod.was_used_within(11));
    }

    #[test]
    fn test_remove_from_disk() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "https://h.com/a/b");
        fs::create_dir_all(pod.repo_dir().join("objects")).unwrap();
        fs::write(pod.lock_file_path(), b"").unwrap();
        pod.touch_last_used().unwrap();

        pod.remove_from_disk().unwrap();
        assert!(!pod.pod_dir().exists());

        // Already gone is fine.
        pod.remove_from_disk().unwrap();
    }

    #[test]
    fn test_disk_usage_kb() {
        let temp = TempDir::new().unwrap();
        let pod = pod_in(&temp, "https://h.com/a/b");
        assert_eq!(pod.disk_usage_kb(), 0);

        fs::create_dir_all(pod.repo_dir().join("objects")).unwrap();
        fs::write(pod.repo_dir().join("objects/pack"), vec![0u8; 4096]).unwrap();
        fs::write(pod.repo_dir().join("HEAD"), vec![0u8; 2048]).unwrap();
        assert_eq!(pod.disk_usage_kb(), 6);
    }

    #[test]
    fn test_list_pods() {
        let temp = TempDir::new().unwrap();
        assert!(list_pods(temp.path()).unwrap().is_empty());

        let b = pod_in(&temp, "https://h.com/b");
        let a = pod_in(&temp, "https://h.com/a");
        fs::create_dir_all(b.pod_dir()).unwrap();
        fs::create_dir_all(a.pod_dir()).unwrap();
        fs::write(repos_dir(temp.path()).join("stray-file"), b"").unwrap();

        assert_eq!(list_pods(temp.path()).unwrap(), vec![a, b]);
    }
}
