//! CLI integration tests for the phylum binary.

mod common;

use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

use common::phylum_cmd;

/// Run `phylum init` in `dir` and add a broken answer to repair.
fn init_project(dir: &Path) {
    phylum_cmd(dir).arg("init").assert().success();
    std::fs::write(dir.join("answer.txt"), "broken\n").unwrap();
}

/// A `phylum run` with the shell vendor and no reasoning backend.
fn run_cmd(dir: &Path, agent: &str) -> assert_cmd::Command {
    let mut cmd = phylum_cmd(dir);
    cmd.env("PHYLUM_REASONING__BACKEND", "none")
        .env("PHYLUM_EVOLUTION__POLL_INTERVAL_MS", "50")
        .args([
            "run",
            "Make answer.txt say fixed",
            "--eval",
            "grep -q fixed answer.txt",
            "--vendor",
            "shell",
            "-n",
            "1",
            "-g",
            "1",
            "--agent-config",
        ])
        .arg(format!("command={agent}"))
        .arg("--json");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {}", String::from_utf8_lossy(&output.stdout)))
}

#[test]
fn test_help_lists_commands_but_not_sandbox_exec() {
    let dir = TempDir::new().unwrap();
    phylum_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("sandbox-exec").not());
}

#[test]
fn test_commands_require_init() {
    let dir = TempDir::new().unwrap();
    phylum_cmd(dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("phylum init"));
}

#[test]
fn test_init_twice_needs_force() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    assert!(dir.path().join(".phylum/config.yaml").exists());

    phylum_cmd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));

    phylum_cmd(dir.path())
        .args(["init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reinitialized"));
}

#[test]
fn test_status_without_runs_is_an_error() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    phylum_cmd(dir.path())
        .args(["status", "--json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"success\": false"));

    phylum_cmd(dir.path())
        .args(["status", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs found."));
}

#[test]
fn test_run_status_results_and_logs() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    let output = run_cmd(dir.path(), "echo editing answer.txt; echo fixed > answer.txt")
        .assert()
        .success()
        .get_output()
        .clone();
    let report = stdout_json(&output);
    assert_eq!(report["status"], "done");
    assert_eq!(report["steps"][0]["status"], "done");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("answer.txt")).unwrap(),
        "fixed\n"
    );
    let run_id = report["id"].as_str().unwrap().to_string();

    let status = phylum_cmd(dir.path())
        .args(["status", &run_id[..8], "--json"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(stdout_json(&status)["id"], run_id.as_str());

    let results = phylum_cmd(dir.path())
        .args(["results", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();
    let results = stdout_json(&results);
    assert_eq!(results["total"], 1);
    let agent = &results["agents"][0];
    assert_eq!(agent["winner"], true);
    assert_eq!(agent["score"], 1.0);
    let agent_id = agent["id"].as_str().unwrap().to_string();

    phylum_cmd(dir.path())
        .args(["logs", &agent_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("editing answer.txt"));

    phylum_cmd(dir.path())
        .args(["logs", &agent_id, "--raw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("editing answer.txt"));

    phylum_cmd(dir.path())
        .args(["status", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&run_id[..8]));

    // finished runs resume as a no-op
    phylum_cmd(dir.path())
        .args(["resume", &run_id[..8]])
        .assert()
        .success();

    // the rotating log file sits under .phylum/logs
    let logs: Vec<_> = std::fs::read_dir(dir.path().join(".phylum/logs"))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert!(!logs.is_empty());
}

#[test]
fn test_failed_run_exits_with_one() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    let output = run_cmd(dir.path(), "echo giving up")
        .assert()
        .code(1)
        .get_output()
        .clone();
    let report = stdout_json(&output);
    assert_eq!(report["status"], "failed");
    assert!(report["error"].as_str().unwrap().contains("no passing agent"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("answer.txt")).unwrap(),
        "broken\n"
    );
}

#[test]
fn test_unknown_vendor_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    phylum_cmd(dir.path())
        .args(["run", "plan", "--eval", "true", "--vendor", "copilot"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown vendor"));
}

#[test]
fn test_sandbox_exec_records_setup_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("repo")).unwrap();

    // no task.json: the runner reports and still exits 0
    phylum_cmd(dir.path())
        .arg("sandbox-exec")
        .arg(dir.path())
        .assert()
        .success();

    let status: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("results/status.json")).unwrap()).unwrap();
    assert_eq!(status["status"], "error");
    assert_eq!(status["error_kind"], "setup");
}
