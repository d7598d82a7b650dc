//! Runs the memtop binary and checks what it prints.

use std::process::{Command, Output};

fn memtop(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_memtop"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run memtop")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout).lines().map(str::to_owned).collect()
}

#[test]
fn test_default_run_prints_top_five() {
    let output = memtop(&["--quiet"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "Top 5 memory consumers:");

    let entries = &lines[1..];
    assert!(!entries.is_empty() && entries.len() <= 5, "got {lines:#?}");
    assert!(entries.iter().all(|l| l.contains(": size=") && l.contains(", count=")));

    // The 100 lists dominate: at least 800 KB from sample.rs
    let top = &entries[0];
    assert!(top.contains("sample.rs:"), "top entry was {top}");
    assert!(top.contains("KiB") || top.contains("MiB"), "top entry was {top}");
}

#[test]
fn test_top_and_key_type_flags() {
    let output = memtop(&["--quiet", "--top", "2", "--key-type", "filename"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "Top 2 memory consumers:");
    assert!(lines.len() <= 3);
    // Filename grouping drops the line number
    assert!(lines[1].contains("sample.rs:0:"), "got {}", lines[1]);
}

#[test]
fn test_summary_goes_to_stderr() {
    let output = memtop(&["--rows", "10", "--cols", "10"]);
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("traced: current="));
    assert!(stderr.contains("total traced size:"));
}

#[test]
fn test_dump_then_load_reports_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    let path = path.to_str().unwrap();

    let traced = memtop(&["--quiet", "--dump", path]);
    assert!(traced.status.success());

    let replayed = memtop(&["--quiet", "--load", path]);
    assert!(replayed.status.success(), "stderr: {}", String::from_utf8_lossy(&replayed.stderr));
    assert_eq!(stdout_lines(&traced), stdout_lines(&replayed));
}

#[test]
fn test_compare_against_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.json");
    let path = path.to_str().unwrap();

    assert!(memtop(&["--quiet", "--rows", "10", "--dump", path]).status.success());

    let output = memtop(&["--quiet", "--rows", "200", "--compare", path]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "Top 5 differences:");
    let sample = lines.iter().find(|l| l.contains("sample.rs:")).expect("sample.rs diff");
    assert!(sample.contains("(+"), "got {sample}");
}

#[test]
fn test_invalid_frame_limit_is_usage_error() {
    let output = memtop(&["--frames", "0"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("traceback limit"));
}

#[test]
fn test_cumulative_traceback_is_usage_error() {
    let output = memtop(&["--quiet", "--key-type", "traceback", "--cumulative"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_snapshot_file_fails() {
    let output = memtop(&["--load", "/nonexistent/memtop.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load"));
}
