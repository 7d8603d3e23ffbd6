//! End-to-end tests for the `apply` command
//!
//! These tests invoke the actual CLI binary and validate its behavior
//! from a user's perspective.

mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Test that --help flag shows help information
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_help() {
    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.arg("apply")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Check out the upstream and apply all patch layers",
        ));
}

/// Test that missing config file produces an error
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_missing_config() {
    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.arg("apply")
        .arg("--config")
        .arg("/nonexistent/.patchstack.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

/// Test that missing default config file produces an error
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_missing_default_config() {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.current_dir(temp.path())
        .arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains(".patchstack.yaml"));
}

/// Test that a malformed config produces a parse error with a hint
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_invalid_config() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config_file = temp.child(".patchstack.yaml");
    config_file.write_str("fork: ''\n").unwrap();

    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.arg("apply")
        .arg("--config")
        .arg(config_file.path())
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hint:"));
}

/// Test a full apply run against a local upstream fixture
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_full_stack() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fixture = common::build(temp.path());

    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.current_dir(temp.path())
        .arg("apply")
        .arg("--config")
        .arg(&fixture.config_path)
        .arg("--color")
        .arg("never")
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 3 patches"));

    temp.child("work/base.txt")
        .assert(predicate::str::contains("base layer notes"));
    temp.child("work/greeting.txt")
        .assert(predicate::str::contains("patched world"));
    temp.child("work/feature.txt").assert(predicate::path::exists());
}

/// Test that the config path can come from the environment
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_apply_config_from_env() {
    let temp = assert_fs::TempDir::new().unwrap();
    let fixture = common::build(temp.path());

    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.current_dir(temp.path())
        .env("PATCHSTACK_CONFIG", &fixture.config_path)
        .arg("apply")
        .arg("--quiet")
        .assert()
        .success();
}

/// Test that completions generation covers the subcommands
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_completions_bash() {
    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("patchstack"))
        .stdout(predicate::str::contains("rebuild"));
}

/// Test that completions generation works without git on the PATH
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_completions_do_not_need_git() {
    let mut cmd = cargo_bin_cmd!("patchstack");

    cmd.env("PATH", "")
        .arg("completions")
        .arg("zsh")
        .assert()
        .success()
        .stdout(predicate::str::contains("patchstack"));
}
