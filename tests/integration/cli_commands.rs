#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::assert::Assert;
use assert_cmd::Command;
use refscan::lock::ToolLock;
use serde_json::Value;
use tempfile::TempDir;

fn refscan(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("refscan");
    cmd.arg("--tmpdir")
        .arg(dir.join("logs"))
        .arg("--lock-file")
        .arg(dir.join("refscan.lock"))
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--quiet");
    cmd
}

fn seeded_store(corrupt: bool) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let store = dir.path().join("graph.json");
    let mut cmd = refscan(dir.path());
    cmd.arg("seed-demo").arg(&store);
    if corrupt {
        cmd.arg("--corrupt");
    }
    cmd.assert().success();
    (dir, store)
}

fn json_output(cmd: &mut Command, code: i32) -> Value {
    let output = cmd.assert().code(code).get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn clean_store_scans_with_exit_zero() {
    let (dir, store) = seeded_store(false);
    let json = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan"])
            .arg(&store),
        0,
    );
    assert_eq!(json["state"], "converged");
    assert_eq!(json["cycles"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["cycles"][0]["errors"], 0);
    assert!(dir.path().join("logs").join("refscan.log").exists());
    assert!(ToolLock::acquire(dir.path().join("refscan.lock")).is_ok());
}

#[test]
fn corruption_without_fix_exits_one() {
    let (dir, store) = seeded_store(true);
    let json = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan"])
            .arg(&store),
        1,
    );
    assert_eq!(json["repair"], false);
    assert_eq!(json["cycles"][0]["errors"], 4);
    assert_eq!(json["cycles"][0]["repairs"], 0);
    assert_eq!(json["findings"].as_array().map(Vec::len), Some(4));
}

#[test]
fn fix_repairs_and_persists() {
    let (dir, store) = seeded_store(true);
    let json = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan", "--fix"])
            .arg(&store),
        0,
    );
    assert_eq!(json["state"], "converged");
    assert_eq!(json["cycles"][0]["repairs"], 4);

    let rescan = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan"])
            .arg(&store),
        0,
    );
    assert_eq!(rescan["cycles"][0]["errors"], 0);
}

#[test]
fn scan_accepts_a_dotted_subtree_path() {
    let (dir, store) = seeded_store(true);
    // ZenUsers holds only the broken SearchManager.
    let json = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan", "--path"])
            .arg("app.zport.dmd.ZenUsers")
            .arg(&store),
        1,
    );
    assert_eq!(json["cycles"][0]["errors"], 1);
}

#[test]
fn invalid_path_exits_one() {
    let (dir, store) = seeded_store(false);
    let assert = refscan(dir.path())
        .args(["--skip-events", "scan", "--path", "/zport/nowhere"])
        .arg(&store)
        .assert()
        .code(1);
    assert!(stderr_of(assert).contains("Invalid path"));
}

#[test]
fn missing_store_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    refscan(dir.path())
        .arg("scan")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(1);
}

#[test]
fn held_lock_fails_fast() {
    let (dir, store) = seeded_store(false);
    let held = ToolLock::acquire(dir.path().join("refscan.lock")).expect("lock");
    let assert = refscan(dir.path())
        .arg("scan")
        .arg(&store)
        .assert()
        .code(1);
    assert!(stderr_of(assert).contains("lock already held"));
    drop(held);
}

#[test]
fn leftover_lock_file_does_not_block() {
    let (dir, store) = seeded_store(false);
    fs::write(dir.path().join("refscan.lock"), "4242\n").expect("write lock");
    refscan(dir.path())
        .args(["--skip-events", "scan"])
        .arg(&store)
        .assert()
        .success();
}

#[test]
fn events_file_records_run_summary() {
    let (dir, store) = seeded_store(true);
    let events = dir.path().join("events.jsonl");
    refscan(dir.path())
        .arg("--events-file")
        .arg(&events)
        .arg("scan")
        .arg(&store)
        .assert()
        .code(1);
    let contents = fs::read_to_string(&events).expect("events written");
    let event: Value = serde_json::from_str(contents.trim()).expect("json line");
    assert_eq!(event["tool"], "refscan-scan");
    assert_eq!(event["severity"], 4);
    assert_eq!(event["component"], "executionStatus");
    assert_eq!(event["errors"], 4);
}

#[test]
fn skip_events_writes_nothing() {
    let (dir, store) = seeded_store(false);
    let events = dir.path().join("events.jsonl");
    refscan(dir.path())
        .arg("--skip-events")
        .arg("--events-file")
        .arg(&events)
        .arg("scan")
        .arg(&store)
        .assert()
        .success();
    assert!(!events.exists());
}

#[test]
fn config_file_sets_the_cycle_budget() {
    let (dir, store) = seeded_store(true);
    fs::write(dir.path().join("config.toml"), "[scan]\ncycles = 1\n").expect("config");
    let json = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scan", "--fix"])
            .arg(&store),
        0,
    );
    assert_eq!(json["max_cycles"], 1);
    assert_eq!(json["state"], "exhausted_budget");
}

#[test]
fn scrub_lists_and_cleans_catalogs() {
    let (dir, store) = seeded_store(true);
    let listed = json_output(
        refscan(dir.path())
            .args(["--format", "json", "scrub", "--list"])
            .arg(&store),
        0,
    );
    assert_eq!(listed[0][0], "Devices.deviceSearch");
    assert_eq!(listed[0][1], 3);

    refscan(dir.path())
        .args(["--skip-events", "scrub"])
        .arg(&store)
        .assert()
        .code(1);

    let cleaned = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "scrub", "--fix"])
            .arg(&store),
        0,
    );
    assert_eq!(cleaned["reports"][0]["passes"][0]["removed"], 1);
    assert_eq!(cleaned["remaining_stale"], 0);
}

#[test]
fn scrub_rejects_unknown_catalog() {
    let (dir, store) = seeded_store(false);
    let assert = refscan(dir.path())
        .args(["--skip-events", "scrub", "--catalog", "Networks.ipSearch"])
        .arg(&store)
        .assert()
        .code(1);
    assert!(stderr_of(assert).contains("unknown catalog"));
}

#[test]
fn reindex_lists_supported_types() {
    let (dir, store) = seeded_store(false);
    let listed = json_output(
        refscan(dir.path())
            .args(["--format", "json", "reindex", "--list"])
            .arg(&store),
        0,
    );
    assert_eq!(listed.as_array().map(Vec::len), Some(5));
    assert_eq!(listed[0]["name"], "Devices");

    refscan(dir.path())
        .arg("reindex")
        .arg(&store)
        .assert()
        .code(1);
}

#[test]
fn reindex_rebuilds_device_catalogs() {
    let (dir, store) = seeded_store(false);
    let report = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "reindex", "--type", "Devices"])
            .arg(&store),
        0,
    );
    assert_eq!(report["indexed"], 2);
    assert_eq!(report["components"], 2);
    assert_eq!(report["failures"], 0);

    let listed = json_output(
        refscan(dir.path())
            .args(["--format", "json", "scrub", "--list"])
            .arg(&store),
        0,
    );
    assert_eq!(listed[0][0], "Devices.componentSearch");
    assert_eq!(listed[0][1], 2);
    assert_eq!(listed[1][0], "Devices.deviceSearch");
}

#[test]
fn reindex_over_corruption_exits_one() {
    let (dir, store) = seeded_store(true);
    let report = json_output(
        refscan(dir.path())
            .args(["--skip-events", "--format", "json", "reindex", "--type", "Devices"])
            .arg(&store),
        1,
    );
    assert!(report["failures"].as_u64().unwrap_or(0) > 0);
}

#[test]
fn reindex_of_an_absent_organizer_exits_one() {
    let (dir, store) = seeded_store(false);
    let assert = refscan(dir.path())
        .args(["--skip-events", "reindex", "--type", "Networks"])
        .arg(&store)
        .assert()
        .code(1);
    assert!(stderr_of(assert).contains("Invalid path"));
}

fn stderr_of(assert: Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}
