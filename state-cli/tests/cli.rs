//! Binary smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn statesync(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("statesync").unwrap();
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("statesync")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("ping"));
}

#[test]
fn status_before_init() {
    let dir = tempdir().unwrap();
    statesync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT INITIALIZED"));
}

#[test]
fn get_before_init_fails() {
    let dir = tempdir().unwrap();
    statesync(dir.path())
        .args(["--mock", "get"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("statesync init"));
}

#[test]
fn init_then_mock_set_and_status() {
    let dir = tempdir().unwrap();
    statesync(dir.path())
        .args(["init", "--url", "http://127.0.0.1:4316"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ws://127.0.0.1:4316/api/state"));

    statesync(dir.path())
        .args(["--mock", "set", r#"{"background": true}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("State set"));

    statesync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cached state:"));

    // A fresh mock server is restored from the cache
    statesync(dir.path())
        .args(["--mock", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"background\": true"));
}

#[test]
fn set_rejects_invalid_json() {
    let dir = tempdir().unwrap();
    statesync(dir.path())
        .args(["init", "--url", "http://127.0.0.1:4316"])
        .assert()
        .success();

    statesync(dir.path())
        .args(["--mock", "set", "{nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid JSON"));
}
