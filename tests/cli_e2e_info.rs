//! End-to-end tests for the `info` command.
//!
//! These tests invoke the actual CLI binary and validate the behavior of the
//! `info` subcommand from a user's perspective.

mod common;
use common::prelude::*;

#[test]
fn test_info_help() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("info")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Show what is known about cached repositories",
        ));
}

#[test]
fn test_info_not_in_metadata() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("info")
        .arg("git@example.com:group/project.git")
        .assert()
        .success()
        .stdout(predicate::str::contains("example.com/group/project"))
        .stdout(predicate::str::contains("cached:          no"))
        .stdout(predicate::str::contains("not in cache metadata"));
}

#[test]
fn test_info_json_not_in_metadata() {
    let fixture = TestFixture::new();

    let output = fixture
        .command()
        .arg("info")
        .arg("--json")
        .arg("https://example.com/group/project")
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["normalized_uri"], "example.com/group/project");
    assert_eq!(info["cached"], false);
    assert!(info["record"].is_null());
}

#[test]
fn test_info_all_empty() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("info")
        .arg("--all")
        .assert()
        .success()
        .stdout(predicate::str::contains("No repositories in cache metadata."));

    fixture
        .command()
        .arg("info")
        .arg("--all")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_info_after_add() {
    let fixture = TestFixture::new().with_upstream();

    fixture
        .command()
        .arg("add")
        .arg(fixture.upstream_uri())
        .assert()
        .success();

    fixture
        .command()
        .arg("info")
        .arg(fixture.upstream_uri())
        .assert()
        .success()
        .stdout(predicate::str::contains("cached:          yes"))
        .stdout(predicate::str::contains("uses:            0"));

    fixture
        .command()
        .arg("info")
        .arg("--all")
        .assert()
        .success()
        .stdout(predicate::str::contains("upstream/project"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_info_with_json_metadata_store() {
    let fixture = TestFixture::new().with_upstream();

    fixture
        .command()
        .arg("--metadata-store")
        .arg("json")
        .arg("add")
        .arg(fixture.upstream_uri())
        .assert()
        .success();

    assert!(fixture.root().join("metadata.json").is_file());
    assert!(!fixture.root().join("metadata.db").exists());

    fixture
        .command()
        .arg("--metadata-store")
        .arg("json")
        .arg("info")
        .arg(fixture.upstream_uri())
        .assert()
        .success()
        .stdout(predicate::str::contains("cached:          yes"));
}
