//! Integration tests for the CLI commands

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_version_command() {
    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("version");

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("scribe "));
}

#[test]
fn test_version_flag() {
    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("scribe "));
}

#[test]
fn test_config_prints_defaults() {
    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("confidence_threshold = 0.3"))
        .stdout(predicate::str::contains("max_queued = 256"))
        .stdout(predicate::str::contains("coalesce_duplicates = false"));
}

#[test]
fn test_config_file_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scribe.toml");
    std::fs::write(&path, "max_queued = 7\nrequest_timeout_ms = 1500\n").unwrap();

    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("config").arg("--config").arg(&path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("max_queued = 7"))
        .stdout(predicate::str::contains("request_timeout_ms = 1500"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scribe.toml");
    std::fs::write(&path, "confidence_threshold = 2.0\n").unwrap();

    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("config").arg("-c").arg(&path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("confidence_threshold"));
}

#[test]
fn test_recognize_missing_path_fails() {
    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.args(["recognize", "/definitely/not/here.png"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("path not found"));
}

#[test]
fn test_recognize_empty_directory_fails() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("recognize").arg(dir.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no image files found"));
}

#[test]
fn test_recognize_requires_paths() {
    let mut cmd = cargo_bin_cmd!("scribe");
    cmd.arg("recognize");

    cmd.assert().failure();
}
