//! Basic CLI E2E tests.
//!
//! Each test runs the binary against its own temporary HOME so the
//! database and config never touch the real user directory.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Run a CLI command with `input` on stdin and return (code, stdout, stderr).
fn run_cli(home: &TempDir, args: &[&str], input: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_repcount"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("REPCOUNT_ENV")
        .env("REPCOUNT_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute CLI command");

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).unwrap();
    }
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (output.status.code().unwrap_or(-1), stdout, stderr)
}

#[test]
fn test_config_defaults_and_set() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(&home, &["config", "get", "session.rest_minutes"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2");

    let (code, _, _) = run_cli(&home, &["config", "set", "session.rest_minutes", "4"], "");
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(&home, &["config", "get", "session.rest_minutes"], "");
    assert_eq!(stdout.trim(), "4");

    let (code, _, stderr) = run_cli(&home, &["config", "set", "session.rest_minutes", "0"], "");
    assert_ne!(code, 0);
    assert!(stderr.contains("session.rest_minutes"));
}

#[test]
fn test_unknown_day_slot_fails() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(&home, &["train", "99"], "");
    assert_ne!(code, 0);
    assert!(stderr.contains("day slot 99 not found"));
}

#[test]
fn test_rest_override_is_validated() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(&home, &["train", "1", "--rest", "120"], "");
    assert_ne!(code, 0);
    assert!(stderr.contains("rest"));
}

#[test]
fn test_scripted_session_records_history() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(&home, &["seed"], "");
    assert_eq!(code, 0);
    assert!(stdout.contains("day slot 1"));

    let script = "start\nstop\nskip-rest\nstart\nweight 85\nfinish\nend\n";
    let (code, _, stderr) = run_cli(&home, &["train", "1"], script);
    assert_eq!(code, 0, "train failed: {stderr}");

    let (code, stdout, _) = run_cli(&home, &["history", "1", "--json"], "");
    assert_eq!(code, 0);
    let history: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["weight_kg"], 85.0);
    assert_eq!(entries[0]["series"], 3);

    let (code, stdout, _) = run_cli(&home, &["alarms", "list"], "");
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "[]");
}
