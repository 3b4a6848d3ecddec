#![allow(missing_docs)]

use std::path::PathBuf;

use refscan::{
    demo::seed_demo,
    scan::{ProgressReporter, RecordingSink, POLL_STATUS_ATTRIBUTE},
    scan, CycleState, MemoryStore, ObjectClass, ObjectStore, PhysicalPath, ScanOptions,
};
use tempfile::TempDir;

fn demo_file(corrupt: bool) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.json");
    let mut store = MemoryStore::create(&path).expect("create store");
    seed_demo(&mut store, corrupt).expect("seed demo");
    (dir, path)
}

fn node(store: &mut MemoryStore, path: &str) -> refscan::NodeRef {
    store
        .resolve_path(&PhysicalPath::parse(path))
        .expect("resolve")
}

#[test]
fn repairs_survive_reopening_the_store() {
    let (_dir, path) = demo_file(true);
    {
        let mut store = MemoryStore::open(&path).expect("open");
        let report = scan(
            &mut store,
            "/",
            ScanOptions::repairing(3),
            ProgressReporter::silent(),
        )
        .expect("scan");
        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.total_repairs(), 4);
    }

    let mut reopened = MemoryStore::open(&path).expect("reopen");
    let web1 = node(&mut reopened, "/zport/dmd/Devices/Server/devices/web1");
    assert_eq!(reopened.status(&web1, POLL_STATUS_ATTRIBUTE), Ok(0));
    let search = reopened
        .child(&web1, "componentSearch")
        .expect("componentSearch link");
    assert_eq!(search.class(), ObjectClass::ComponentSearch);
    assert!(reopened.identity(&search).is_ok());

    let interfaces = node(&mut reopened, "/zport/dmd/Devices/Server/devices/db1/os/interfaces");
    assert_eq!(reopened.invoke(&interfaces), Ok(0));

    let report = scan(
        &mut reopened,
        "/",
        ScanOptions::scan_only(),
        ProgressReporter::silent(),
    )
    .expect("rescan");
    assert!(report.is_clean());
}

#[test]
fn scan_only_leaves_the_file_untouched() {
    let (_dir, path) = demo_file(true);
    let before = std::fs::read(&path).expect("read");
    let mut store = MemoryStore::open(&path).expect("open");
    let report = scan(
        &mut store,
        "app.zport.dmd",
        ScanOptions::scan_only(),
        ProgressReporter::silent(),
    )
    .expect("scan");
    assert_eq!(report.remaining_errors(), 4);
    assert_eq!(store.commits(), 0);
    assert_eq!(std::fs::read(&path).expect("read"), before);
}

#[test]
fn repair_progress_lines_carry_the_repairs_column() {
    let (_dir, path) = demo_file(true);
    let mut store = MemoryStore::open(&path).expect("open");
    let sink = RecordingSink::default();
    let options = ScanOptions {
        progress_interval: 10,
        ..ScanOptions::repairing(2)
    };
    let report = scan(
        &mut store,
        "/",
        options,
        ProgressReporter::new(Box::new(sink.clone()), true),
    )
    .expect("scan");

    let finished = sink.finished();
    assert_eq!(finished.len(), report.cycles.len());
    assert!(finished[0].contains("Cycle 1"));
    assert!(finished[0].contains("Repairs:      4 |"));
    assert!(finished[1].contains("Errors:      0 |"));
    let expected_updates: u64 = report.cycles.iter().map(|cycle| cycle.items / 10).sum();
    assert_eq!(sink.updates().len() as u64, expected_updates);
}

#[test]
fn small_windows_and_unlimited_memory_agree() {
    let (_dir, path) = demo_file(true);
    let mut bounded = MemoryStore::open(&path).expect("open");
    let mut unbounded = MemoryStore::open(&path).expect("open");

    let tight = ScanOptions {
        progress_interval: 1,
        ..ScanOptions::scan_only()
    };
    let loose = ScanOptions {
        unlimited_memory: true,
        ..ScanOptions::scan_only()
    };
    let a = scan(&mut bounded, "/", tight, ProgressReporter::silent()).expect("scan");
    let b = scan(&mut unbounded, "/", loose, ProgressReporter::silent()).expect("scan");
    assert_eq!(a.cycles, b.cycles);
    assert!(bounded.aborts() > unbounded.aborts());
}
