//! Drives the `taskhub` binary against markdown storage and a source that
//! cannot be reached, so no test needs the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn taskhub_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("taskhub"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "off");
    cmd
}

/// Settings whose source points at a closed local port.
fn write_config(home: &Path, lists: &[(&str, &str)]) -> PathBuf {
    let dir = home.join("lists");
    let mut yaml = format!(
        "retry: {{ max_attempts: 1, initial_backoff_ms: 0, max_backoff_ms: 0 }}\n\
         search_prefix: \"is:open\"\n\
         source: {{ kind: github, token: t, api_url: \"http://127.0.0.1:9\" }}\n\
         storage: {{ kind: markdown, dir: \"{}\" }}\n\
         lists:\n",
        dir.display()
    );
    for (name, query) in lists {
        yaml.push_str(&format!("  \"{name}\": \"{query}\"\n"));
    }
    let path = home.join("taskhub.yaml");
    fs::write(&path, yaml).expect("write config");
    path
}

#[test]
fn init_writes_starter_config_once() {
    let home = TempDir::new().expect("home");
    let config = home.path().join(".taskhub").join("config.yaml");

    taskhub_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Wrote starter settings"));
    let first = fs::read_to_string(&config).expect("config written");
    assert!(first.contains("lists:"));

    fs::write(&config, "edited: true\n").expect("edit");
    taskhub_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already exist"));
    assert_eq!(fs::read_to_string(&config).expect("read"), "edited: true\n");

    taskhub_cmd(home.path())
        .args(["init", "--force"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&config).expect("read"), first);
}

#[test]
fn lists_prints_resolved_queries() {
    let home = TempDir::new().expect("home");
    let config = write_config(home.path(), &[("Review", "review-requested:@me")]);

    taskhub_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .arg("lists")
        .assert()
        .success()
        .stdout(contains("Review").and(contains("is:open review-requested:@me")));

    let output = taskhub_cmd(home.path())
        .args(["lists", "--json", "--config"])
        .arg(&config)
        .output()
        .expect("run lists --json");
    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("lists json");
    assert_eq!(payload[0]["container"], "Review");
    assert_eq!(payload[0]["query"], "is:open review-requested:@me");
}

#[test]
fn missing_settings_fail_with_hint() {
    let home = TempDir::new().expect("home");

    taskhub_cmd(home.path())
        .arg("lists")
        .assert()
        .failure()
        .stderr(contains("taskhub init"));
}

#[test]
fn sync_reports_failed_task_and_exits_non_zero() {
    let home = TempDir::new().expect("home");
    let config = write_config(
        home.path(),
        &[("Review", "review-requested:@me"), ("Assigned", "assignee:@me")],
    );

    taskhub_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .arg("sync")
        .assert()
        .failure()
        .stdout(contains("✗ 'Assigned' failed").and(contains("✗ 'Review' failed")))
        .stderr(contains("2 of 2 sync tasks failed"));

    // Search failed before any storage write.
    assert!(!home.path().join("lists").join("Review.md").exists());
}

#[test]
fn sync_rejects_unknown_container() {
    let home = TempDir::new().expect("home");
    let config = write_config(home.path(), &[("Review", "review-requested:@me")]);

    taskhub_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["sync", "--container", "Nope", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("unknown container 'Nope'").and(contains("Review")));
}

#[test]
fn diff_reports_unreachable_source() {
    let home = TempDir::new().expect("home");
    let config = write_config(home.path(), &[("Review", "review-requested:@me")]);

    taskhub_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["diff", "--container", "Review"])
        .assert()
        .failure()
        .stdout(contains("✗ 'Review'"))
        .stderr(contains("could not be compared"));
}

#[test]
fn daemon_status_when_not_running() {
    let home = TempDir::new().expect("home");

    let output = taskhub_cmd(home.path())
        .args(["daemon", "status"])
        .output()
        .expect("daemon status");
    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status json");
    assert_eq!(payload["running"], serde_json::Value::Bool(false));
    assert!(payload["socket"]
        .as_str()
        .is_some_and(|socket| socket.ends_with(".taskhub/daemon.sock")));

    taskhub_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));

    taskhub_cmd(home.path())
        .args(["daemon", "sync"])
        .assert()
        .failure()
        .stderr(contains("daemon start"));
}
