//! # External Git Boundary
//!
//! All interaction with the `git` executable goes through the
//! [`GitOperations`] trait, so the lifecycle manager can be exercised in tests
//! against a mock and in production against [`SystemGit`].
//!
//! `SystemGit` uses the system `git` command, which automatically handles SSH
//! keys, credential helpers and any authentication configured in
//! `~/.gitconfig`. Clone and fetch inherit the terminal so git's progress
//! output reaches the user; only the exit code is inspected. `config --get`
//! and remote URL lookups capture stdout.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the cached clone is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMode {
    /// `git clone --bare`
    #[default]
    Bare,
    /// `git clone --mirror`
    Mirror,
}

impl CloneMode {
    /// The `git clone` flag for this mode.
    pub fn as_arg(&self) -> &'static str {
        match self {
            CloneMode::Bare => "--bare",
            CloneMode::Mirror => "--mirror",
        }
    }
}

impl fmt::Display for CloneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneMode::Bare => f.write_str("bare"),
            CloneMode::Mirror => f.write_str("mirror"),
        }
    }
}

impl FromStr for CloneMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bare" => Ok(CloneMode::Bare),
            "mirror" => Ok(CloneMode::Mirror),
            other => Err(Error::InvalidArgument {
                message: format!("unknown clone mode '{}' (expected bare or mirror)", other),
            }),
        }
    }
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// `git clone --bare|--mirror [args] <uri> <repo_dir>`
    fn clone_into_pod(
        &self,
        uri: &str,
        repo_dir: &Path,
        mode: CloneMode,
        args: &[String],
    ) -> Result<()>;

    /// `git -C <repo_dir> fetch [args]`
    fn fetch(&self, repo_dir: &Path, args: &[String]) -> Result<()>;

    /// `git clone --reference <reference> [--dissociate] [args] <uri> [<dest>]`
    fn reference_clone(
        &self,
        uri: &str,
        reference: &Path,
        dest: Option<&Path>,
        dissociate: bool,
        args: &[String],
    ) -> Result<()>;

    /// `git clone [args] <uri> [<dest>]`, bypassing the cache.
    fn clone_uncached(&self, uri: &str, dest: Option<&Path>, args: &[String]) -> Result<()>;

    /// `git config --get <key>`; `None` when the key is unset.
    fn config_get(&self, key: &str) -> Result<Option<String>>;

    /// The `remote.origin.url` of a cached clone.
    fn remote_url(&self, repo_dir: &Path) -> Result<Option<String>>;
}

/// Arguments for cloning into a pod.
pub fn clone_into_pod_args(
    uri: &str,
    repo_dir: &Path,
    mode: CloneMode,
    args: &[String],
) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec!["clone".into(), mode.as_arg().into()];
    cmd.extend(args.iter().map(OsString::from));
    cmd.push(uri.into());
    cmd.push(repo_dir.into());
    cmd
}

/// Arguments for fetching in a cached clone.
pub fn fetch_args(repo_dir: &Path, args: &[String]) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec!["-C".into(), repo_dir.into(), "fetch".into()];
    cmd.extend(args.iter().map(OsString::from));
    cmd
}

/// Arguments for a reference clone.
pub fn reference_clone_args(
    uri: &str,
    reference: &Path,
    dest: Option<&Path>,
    dissociate: bool,
    args: &[String],
) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec!["clone".into(), "--reference".into(), reference.into()];
    if dissociate {
        cmd.push("--dissociate".into());
    }
    cmd.extend(args.iter().map(OsString::from));
    cmd.push(uri.into());
    if let Some(dest) = dest {
        cmd.push(dest.into());
    }
    cmd
}

/// Arguments for an uncached clone.
pub fn uncached_clone_args(uri: &str, dest: Option<&Path>, args: &[String]) -> Vec<OsString> {
    let mut cmd: Vec<OsString> = vec!["clone".into()];
    cmd.extend(args.iter().map(OsString::from));
    cmd.push(uri.into());
    if let Some(dest) = dest {
        cmd.push(dest.into());
    }
    cmd
}

/// Whether fetch arguments ask git to prune remote-tracking refs.
pub fn is_prune_requested(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "--prune" || arg == "-p")
}

/// The default implementation of `GitOperations`, which runs the system
/// `git` command.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: OsString,
}

impl SystemGit {
    pub fn new() -> Self {
        Self {
            program: OsString::from("git"),
        }
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn run(&self, args: Vec<OsString>) -> Result<()> {
        let command = self.command_line(&args);
        debug!("running {}", command);
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|e| {
                debug!("failed to spawn git: {}", e);
                Error::GitCommandFailed {
                    command: command.clone(),
                    code: None,
                }
            })?;
        check_status(command, status)
    }

    fn capture(&self, args: Vec<OsString>) -> Result<Option<String>> {
        let command = self.command_line(&args);
        debug!("running {}", command);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| {
                debug!("failed to spawn git: {}", e);
                Error::GitCommandFailed {
                    command: command.clone(),
                    code: None,
                }
            })?;

        // `git config --get` exits 1 for an unset key.
        if output.status.code() == Some(1) {
            return Ok(None);
        }
        check_status(command, output.status)?;

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

fn check_status(command: String, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::GitCommandFailed {
            command,
            code: status.code(),
        })
    }
}

impl GitOperations for SystemGit {
    fn clone_into_pod(
        &self,
        uri: &str,
        repo_dir: &Path,
        mode: CloneMode,
        args: &[String],
    ) -> Result<()> {
        self.run(clone_into_pod_args(uri, repo_dir, mode, args))
    }

    fn fetch(&self, repo_dir: &Path, args: &[String]) -> Result<()> {
        self.run(fetch_args(repo_dir, args))
    }

    fn reference_clone(
        &self,
        uri: &str,
        reference: &Path,
        dest: Option<&Path>,
        dissociate: bool,
        args: &[String],
    ) -> Result<()> {
        self.run(reference_clone_args(uri, reference, dest, dissociate, args))
    }

    fn clone_uncached(&self, uri: &str, dest: Option<&Path>, args: &[String]) -> Result<()> {
        self.run(uncached_clone_args(uri, dest, args))
    }

    fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.capture(vec!["config".into(), "--get".into(), key.into()])
    }

    fn remote_url(&self, repo_dir: &Path) -> Result<Option<String>> {
        self.capture(vec![
            "-C".into(),
            repo_dir.into(),
            "config".into(),
            "--get".into(),
            "remote.origin.url".into(),
        ])
    }
}
