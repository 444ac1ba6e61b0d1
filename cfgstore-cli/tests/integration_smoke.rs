//! Smoke tests for the cfgstore binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cfgstore(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cfgstore").unwrap();
    cmd.env_remove("CFGSTORE_DATABASE_URL")
        .env("HOME", dir.path())
        .arg("--database")
        .arg(format!("sqlite://{}", dir.path().join("config.db").display()));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("cfgstore").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("set"));
}

#[test]
fn test_set_help() {
    let mut cmd = Command::cargo_bin("cfgstore").unwrap();
    cmd.arg("set").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Store NULL instead of a value"));
}

#[test]
fn test_missing_database_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("cfgstore").unwrap();
    cmd.env_remove("CFGSTORE_DATABASE_URL")
        .env("HOME", dir.path())
        .arg("get")
        .arg("default")
        .arg("a/b");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No database configured"));
}

#[test]
fn test_get_before_init_fails() {
    let dir = tempfile::tempdir().unwrap();
    cfgstore(&dir)
        .args(["get", "default", "general/locale/code"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cfgstore init"));
}

#[test]
fn test_init_set_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();

    cfgstore(&dir).arg("init").assert().success();
    cfgstore(&dir)
        .args(["set", "stores/2", "general/locale/code", "de_DE"])
        .assert()
        .success();

    cfgstore(&dir)
        .args(["get", "stores/2", "general/locale/code"])
        .assert()
        .success()
        .stdout(predicate::str::diff("de_DE\n"));

    cfgstore(&dir)
        .args(["get", "stores/3", "general/locale/code"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No value"));
}

#[test]
fn test_set_null() {
    let dir = tempfile::tempdir().unwrap();

    cfgstore(&dir).arg("init").assert().success();
    cfgstore(&dir)
        .args(["set", "default", "web/cookie/domain", "--null"])
        .assert()
        .success();

    cfgstore(&dir)
        .args(["get", "default", "web/cookie/domain"])
        .assert()
        .success()
        .stdout(predicate::str::diff("NULL\n"));
}

#[test]
fn test_invalid_scope_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cfgstore(&dir)
        .args(["get", "planets/1", "a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown scope name"));
}
