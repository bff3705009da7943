//! CLI smoke tests for the airlift binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn airlift(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("airlift").unwrap();
    // Isolate from any real user configuration and keep output plain
    cmd.env("AIRLIFT_CONFIG_PATH", temp.path().join("config.toml"))
        .env("AIRLIFT_NO_PROGRESS", "1");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let temp = TempDir::new().unwrap();
    airlift(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("update"));
}

#[test]
fn test_version_flag() {
    let temp = TempDir::new().unwrap();
    airlift(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("airlift"));
}

#[test]
fn test_check_without_endpoint_reports_config_error() {
    let temp = TempDir::new().unwrap();
    airlift(&temp)
        .args(["check", "--build", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_check_against_unreachable_endpoint_fails() {
    let temp = TempDir::new().unwrap();
    airlift(&temp)
        .args([
            "check",
            "--build",
            "42",
            "--endpoint",
            "http://127.0.0.1:1/api/version",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network error"));
}

#[test]
fn test_check_requires_build_argument() {
    let temp = TempDir::new().unwrap();
    airlift(&temp).arg("check").assert().failure();
}
