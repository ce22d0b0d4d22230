//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: Success, including expected conditions such as refreshing
//!   or cleaning a repository that is not cached
//! - Exit code 1: General error
//! - Exit code 2: Invalid command-line usage (handled by clap)
//!
//! None of these tests run git against a repository.

mod common;
use common::prelude::*;

/// Exit code 0 is returned for --help.
#[test]
fn test_exit_code_help() {
    let mut cmd = cargo_bin_cmd!("git-cache");

    cmd.arg("--help")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("clone"))
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("info"));
}

/// Exit code 0 is returned for --version.
#[test]
fn test_exit_code_version() {
    let mut cmd = cargo_bin_cmd!("git-cache");

    cmd.arg("--version").assert().code(0);
}

/// Exit code 2 is returned when no subcommand is given.
#[test]
fn test_exit_code_missing_subcommand() {
    let mut cmd = cargo_bin_cmd!("git-cache");

    cmd.assert().code(2);
}

/// Exit code 2 is returned for an unknown subcommand.
#[test]
fn test_exit_code_unknown_subcommand() {
    let mut cmd = cargo_bin_cmd!("git-cache");

    cmd.arg("frobnicate").assert().code(2);
}

/// Exit code 2 is returned when neither a URI nor --all is given.
#[test]
fn test_exit_code_clean_requires_target() {
    let fixture = TestFixture::new();

    fixture.command().arg("clean").assert().code(2);
}

/// Exit code 2 is returned when both a URI and --all are given.
#[test]
fn test_exit_code_refresh_uri_conflicts_with_all() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("refresh")
        .arg("--all")
        .arg("https://example.com/r.git")
        .assert()
        .code(2);
}

/// Exit code 2 is returned for an unknown clone mode.
#[test]
fn test_exit_code_invalid_clone_mode() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("--clone-mode")
        .arg("shallow")
        .arg("info")
        .arg("--all")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("shallow"));
}

/// Exit code 2 is returned for a non-numeric timeout.
#[test]
fn test_exit_code_invalid_timeout() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("--timeout")
        .arg("soon")
        .arg("info")
        .arg("--all")
        .assert()
        .code(2);
}

/// A negative timeout is accepted.
#[test]
fn test_negative_timeout_is_accepted() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("--timeout")
        .arg("-1")
        .arg("info")
        .arg("--all")
        .assert()
        .code(0);
}

/// Exit code 1 is returned for an address that does not name a repository.
#[test]
fn test_exit_code_invalid_uri() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("add")
        .arg("   ")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid argument"));
}

/// Exit code 1 is returned when a clone-only, no-retry clone finds no cached repository.
#[test]
fn test_exit_code_clone_only_without_cache() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("clone")
        .arg("--clone-only")
        .arg("--no-retry")
        .arg("https://example.com/group/project.git")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("is not cached"));

    assert!(!fixture.root().join("repos").exists());
}
