//! Integration tests for the `miniboard` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and error exit codes, all without a live host.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `miniboard` binary with env isolation.
///
/// Clears all `MINIBOARD_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn miniboard_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("miniboard");
    cmd.env("HOME", "/tmp/miniboard-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/miniboard-cli-test-nonexistent")
        .env_remove("MINIBOARD_HOST")
        .env_remove("MINIBOARD_PORT")
        .env_remove("MINIBOARD_CONFIG")
        .env_remove("MINIBOARD_OUTPUT")
        .env_remove("MINIBOARD_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = miniboard_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    miniboard_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("game-server")
            .and(predicate::str::contains("instances"))
            .and(predicate::str::contains("saves"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    miniboard_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("miniboard"));
}

#[test]
fn test_instances_help_lists_actions() {
    miniboard_cmd()
        .args(["instances", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("start")
                .and(predicate::str::contains("kill"))
                .and(predicate::str::contains("delete"))
                .and(predicate::str::contains("ports")),
        );
}

// ── Completions ─────────────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    miniboard_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("miniboard"));
}

#[test]
fn test_completions_zsh() {
    miniboard_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef miniboard"));
}

#[test]
fn test_completions_fish() {
    miniboard_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete -c miniboard"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    miniboard_cmd()
        .arg("frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_invalid_output_format() {
    miniboard_cmd()
        .args(["-o", "xml", "instances", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_save_help_lists_fields() {
    miniboard_cmd()
        .args(["instances", "save", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--name").and(predicate::str::contains("--port")));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    miniboard_cmd()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    miniboard_cmd()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#"host = "localhost""#)
                .and(predicate::str::contains("port = 6666")),
        );
}

#[test]
fn test_config_show_applies_flags_and_env() {
    let dir = tempfile::tempdir().unwrap();
    miniboard_cmd()
        .env("MINIBOARD_LOG_CAPACITY", "42")
        .args(["config", "show", "-o", "json", "--port", "7001", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""port": 7001"#)
                .and(predicate::str::contains(r#""log_capacity": 42"#)),
        );
}

#[test]
fn test_config_init_with_yes_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    miniboard_cmd()
        .args(["config", "init", "--yes", "--host", "factorio.lan", "--config"])
        .arg(&path)
        .assert()
        .success();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains(r#"host = "factorio.lan""#), "{written}");
}

#[test]
fn test_broken_config_file_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"\n").unwrap();
    miniboard_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .code(2);
}

// ── Host-bound commands ─────────────────────────────────────────────

#[test]
fn test_zero_port_is_rejected_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let output = miniboard_cmd()
        .args(["--port", "0", "instances", "list", "--config"])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("port"), "Expected the port to be named:\n{text}");
}

#[test]
fn test_unreachable_host_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let output = miniboard_cmd()
        .env("MINIBOARD_RECONNECT__MODE", "backoff")
        .args([
            "--host",
            "127.0.0.1",
            "--port",
            "1",
            "--timeout",
            "1",
            "instances",
            "list",
            "--config",
        ])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(8), "Expected the timeout exit code");
    let text = combined_output(&output);
    assert!(text.contains("No reply"), "Expected a timeout report:\n{text}");
}
