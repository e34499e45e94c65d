//! Integration tests for the smpmap CLI.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the smpmap binary.
fn smpmap() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("smpmap").unwrap();
    cmd.env_remove("SMPMAP_MAX_CHILDREN")
        .env_remove("SMPMAP_POLL_TIMEOUT_MS")
        .env_remove("SMPMAP_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help() {
    smpmap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parallel"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_tasks_lists_builtins() {
    smpmap()
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("sine"))
        .stdout(predicate::str::contains("integrate"))
        .stdout(predicate::str::contains("sqrt"))
        .stdout(predicate::str::contains("crash"));
}

#[test]
fn test_run_plain_output() {
    smpmap()
        .args(["run", "sqrt", "4", "9", "2.25", "-j", "2"])
        .assert()
        .success()
        .stdout("#0 2.0\n#1 3.0\n#2 1.5\n");
}

#[test]
fn test_run_without_inputs() {
    smpmap()
        .args(["run", "sqrt"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn test_run_reports_failed_task_in_place() {
    smpmap()
        .args(["run", "sqrt", "4", "-1", "9"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("#0 2.0\n"))
        .stdout(predicate::str::contains("#1 error"))
        .stdout(predicate::str::contains("#2 3.0\n"))
        .stderr(predicate::str::contains("1 of 3 'sqrt' tasks failed"));
}

#[test]
fn test_run_range_keeps_order_with_stagger() {
    smpmap()
        .args(["run", "sine", "--from", "0", "--to", "3", "--stagger-ms", "40", "-j", "4"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^#0 0\.0\n#1 0\.84\d*\n#2 0\.90\d*\n#3 0\.14\d*\n$").unwrap());
}

#[test]
fn test_captured_output_precedes_result() {
    smpmap()
        .args(["run", "integrate", "--from", "1", "--to", "3", "-j", "3"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^1: S=1\.00\n#0 [^\n]+\n2: S=0\.00\n#1 [^\n]+\n3: S=0\.33\n#2 [^\n]+\n$").unwrap());
}

#[test]
fn test_captured_output_to_stderr() {
    smpmap()
        .args(["run", "integrate", "2", "--captured", "stderr"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#0 "))
        .stdout(predicate::str::contains("S=").not())
        .stderr(predicate::str::contains("2: S=0.00"));
}

#[test]
fn test_captured_output_discarded() {
    smpmap()
        .args(["run", "integrate", "1", "--captured", "discard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("S=").not())
        .stderr(predicate::str::contains("S=").not());
}

#[test]
fn test_json_format() {
    let output = smpmap()
        .args(["run", "sqrt", "16", "-4", "--format", "json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], serde_json::json!({"index": 0, "value": 4.0}));
    assert_eq!(lines[1]["index"], 1);
    assert!(
        lines[1]["error"]
            .as_str()
            .unwrap()
            .contains("square root")
    );
}

#[test]
fn test_crashing_worker_is_reported() {
    smpmap()
        .args(["run", "crash", r#""abort""#, r#"{"survive": {"value": 5}}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("#0 error"))
        .stdout(predicate::str::contains("protocol violation"))
        .stdout(predicate::str::contains("#1 5\n"));
}

#[test]
fn test_invalid_json_input() {
    smpmap()
        .args(["run", "sqrt", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_input_of_wrong_shape() {
    smpmap()
        .args(["run", "sqrt", r#""four""#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid 'sqrt' input"));
}

#[test]
fn test_zero_workers_rejected() {
    smpmap()
        .args(["run", "sqrt", "1", "-j", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_children must be at least 1"));
}

#[test]
fn test_max_children_from_env() {
    smpmap()
        .env("SMPMAP_MAX_CHILDREN", "1")
        .args(["run", "sqrt", "1", "4"])
        .assert()
        .success()
        .stdout("#0 1.0\n#1 2.0\n");
}

#[test]
fn test_max_children_flag_beats_env() {
    smpmap()
        .env("SMPMAP_MAX_CHILDREN", "0")
        .args(["run", "sqrt", "1", "4", "-j", "2"])
        .assert()
        .success()
        .stdout("#0 1.0\n#1 2.0\n");
}

#[test]
fn test_invalid_env_values_are_ignored() {
    smpmap()
        .env("SMPMAP_MAX_CHILDREN", "many")
        .env("SMPMAP_POLL_TIMEOUT_MS", "soon")
        .args(["-v", "--log-format", "json", "run", "sqrt", "9"])
        .assert()
        .success()
        .stdout("#0 3.0\n")
        .stderr(predicate::str::contains("Ignoring invalid SMPMAP_MAX_CHILDREN"))
        .stderr(predicate::str::contains("Ignoring invalid SMPMAP_POLL_TIMEOUT_MS"));
}

#[test]
fn test_json_logs_on_stderr() {
    smpmap()
        .args(["-v", "--log-format", "json", "run", "sqrt", "1"])
        .assert()
        .success()
        .stdout("#0 1.0\n")
        .stderr(predicate::str::contains("\"Parallel map finished\""));
}

#[test]
fn test_unknown_task_rejected() {
    smpmap()
        .args(["run", "cube", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
