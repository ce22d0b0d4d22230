//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_upstream();
//!     fixture.command().arg("add").arg(fixture.upstream_uri()).assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::TestFixture;
}

/// Environment variables that would leak the developer's settings into a test.
const CONFIG_ENV_VARS: &[&str] = &[
    "GIT_CACHE_ROOT_DIR",
    "GIT_CACHE_NO_LOCK",
    "GIT_CACHE_LOCK_TIMEOUT",
    "GIT_CACHE_CLONE_MODE",
    "GIT_CACHE_METADATA_STORE",
    "RUST_LOG",
];

/// A temporary directory holding a cache root, a working directory and
/// optionally a local upstream repository.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("work")
            .create_dir_all()
            .expect("Failed to create work directory");
        Self { temp_dir }
    }

    /// Create a local upstream repository with one commit.
    ///
    /// Requires a `git` binary on `PATH`.
    #[allow(dead_code)]
    pub fn with_upstream(self) -> Self {
        let upstream = self.upstream_path();
        std::fs::create_dir_all(&upstream).expect("Failed to create upstream directory");
        git(&upstream, &["init", "--quiet"]);
        std::fs::write(upstream.join("README.md"), "# upstream\n").expect("Failed to write file");
        git(&upstream, &["add", "README.md"]);
        git(
            &upstream,
            &[
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "commit",
                "--quiet",
                "-m",
                "initial",
            ],
        );
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The cache root passed to every command.
    pub fn root(&self) -> PathBuf {
        self.path().join("cache")
    }

    /// The working directory commands run in.
    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    #[allow(dead_code)]
    pub fn upstream_path(&self) -> PathBuf {
        self.path().join("upstream").join("project.git")
    }

    /// `file://` URI of the upstream repository.
    #[allow(dead_code)]
    pub fn upstream_uri(&self) -> String {
        format!("file://{}", self.upstream_path().display())
    }

    /// The pod directory the upstream repository is cached in.
    #[allow(dead_code)]
    pub fn upstream_pod(&self) -> PathBuf {
        let key = git_cache::uri::normalize(&self.upstream_uri()).expect("valid uri");
        git_cache::pod::Pod::new(&self.root(), &key)
            .pod_dir()
            .to_path_buf()
    }

    /// Create a command with an isolated cache root, run in the work directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("git-cache");
        for var in CONFIG_ENV_VARS {
            cmd.env_remove(var);
        }
        // Keep the developer's git config (gitcache.*) out of the way.
        cmd.env("GIT_CONFIG_GLOBAL", self.path().join("gitconfig"))
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .current_dir(self.work_dir())
            .arg("--root-dir")
            .arg(self.root());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}
