//! Integration tests for the CLI interface
//!
//! Tests command parsing, configuration resolution and the bench command

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const PREFETCH_ENV: [&str; 6] = [
    "PREFETCH_WORKERS",
    "PREFETCH_BUFFER_DEPTH",
    "PREFETCH_SEND_HWM",
    "PREFETCH_TRANSPORT",
    "PREFETCH_PIPE_DIR",
    "PREFETCH_MASK_SIGNALS",
];

fn prefetch_cmd() -> Command {
    let mut cmd = Command::cargo_bin("dataflow-prefetch").unwrap();
    for key in PREFETCH_ENV {
        cmd.env_remove(key);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help_flag() {
    prefetch_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("bench"))
        .stdout(predicate::str::contains("show-config"));
}

#[test]
fn test_invalid_command() {
    prefetch_cmd()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_show_config_defaults() {
    prefetch_cmd()
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("workers = 1"))
        .stdout(predicate::str::contains("buffer_depth = 5"))
        .stdout(predicate::str::contains("transport = \"queue\""));
}

#[test]
fn test_show_config_layers_file_env_and_flags() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("prefetch.toml");
    fs::write(&config_path, "workers = 3\nbuffer_depth = 16\n").unwrap();

    prefetch_cmd()
        .env("PREFETCH_BUFFER_DEPTH", "32")
        .args(["show-config", "--config"])
        .arg(&config_path)
        .args(["--transport", "message"])
        .assert()
        .success()
        .stdout(predicate::str::contains("workers = 3"))
        .stdout(predicate::str::contains("buffer_depth = 32"))
        .stdout(predicate::str::contains("transport = \"message\""));
}

#[test]
fn test_show_config_rejects_zero_workers() {
    prefetch_cmd()
        .args(["show-config", "--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn test_bench_queue_transport() {
    prefetch_cmd()
        .args(["bench", "--workers", "2", "--count", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("50 records in"));
}

#[test]
fn test_bench_message_transport() {
    let temp_dir = TempDir::new().unwrap();

    prefetch_cmd()
        .args(["bench", "--transport", "message", "--workers", "2"])
        .args(["--source", "random", "--records", "40", "--pipe-dir"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("40 records in"));

    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_bench_missing_pipe_dir_fails() {
    let temp_dir = TempDir::new().unwrap();

    prefetch_cmd()
        .args(["bench", "--transport", "message", "--pipe-dir"])
        .arg(temp_dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}
