//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn procmap() -> Command {
    Command::cargo_bin("procmap").unwrap()
}

#[test]
fn test_cli_help_flag() {
    procmap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("worker"));
}

#[test]
fn test_run_prints_result_json() {
    procmap()
        .args(["run", "--function", "double", "1", "2", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"result\": 12"))
        .stdout(predicate::str::contains("\"failures\": []"));
}

#[test]
fn test_run_on_shared_pool() {
    procmap()
        .args(["run", "-f", "double", "--engine", "shared-pool", "-j", "2", "4", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"result\": 18"));
}

#[test]
fn test_partial_failure_exits_three() {
    procmap()
        .args(["run", "-f", "fail_above", "--payload", r#"{"limit": 9}"#, "1", "2", "10"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"result\": 6"))
        .stdout(predicate::str::contains("failure with args 10"))
        .stdout(predicate::str::contains("thou shalt not pass more than 9"));
}

#[test]
fn test_run_with_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(
        &path,
        "engine = \"per_task\"\nparallelism = 2\ntask_timeout = \"500ms\"\n",
    )
    .unwrap();

    procmap()
        .args(["run", "-f", "sleep_above", "--payload", r#"{"limit": 1, "millis": 20000}"#])
        .arg("--config")
        .arg(&path)
        .args(["1", "2"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("timed out with arg 2"));
}

#[test]
fn test_zero_parallelism_is_a_configuration_error() {
    procmap()
        .args(["run", "-f", "double", "-j", "0", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("parallelism"));
}

#[test]
fn test_unknown_function_fails() {
    procmap()
        .args(["run", "-f", "triple", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown function"));
}

#[test]
fn test_worker_answers_protocol_lines() {
    let request = r#"{"task_id":4,"function":"double","payload":null,"argument":21}"#;
    procmap()
        .arg("worker")
        .write_stdin(format!("{}\n", request))
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"task_id":4,"outcome":{"Ok":42}}"#));
}
