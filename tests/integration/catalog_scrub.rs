#![allow(missing_docs)]

use refscan::{
    demo::{seed_demo, DEVICE_CATALOG},
    scan::RecordingSink,
    scrub::present_catalogs,
    CatalogScrubber, CycleState, MemoryStore, ObjectClass, ObjectStore, PhysicalPath,
    ScrubOptions,
};
use tempfile::TempDir;

fn repairing(max_cycles: u32) -> ScrubOptions {
    ScrubOptions {
        repair: true,
        max_cycles,
    }
}

#[test]
fn stale_entry_is_removed_and_persisted() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.json");
    {
        let mut store = MemoryStore::create(&path).expect("create");
        seed_demo(&mut store, true).expect("seed");
        let report = CatalogScrubber::silent(repairing(12))
            .scrub(&mut store, DEVICE_CATALOG)
            .expect("scrub");
        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.passes[0].stale, 1);
        assert_eq!(report.passes[0].removed, 1);
        assert_eq!(report.passes[1].stale, 0);
    }
    let mut reopened = MemoryStore::open(&path).expect("reopen");
    let keys: Vec<String> = reopened
        .catalog_entries(DEVICE_CATALOG)
        .expect("catalog")
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(keys, vec!["db1", "web1"]);
}

#[test]
fn replaced_target_counts_as_stale() {
    let mut store = MemoryStore::new();
    seed_demo(&mut store, false).expect("seed");
    let devices = store
        .resolve_path(&PhysicalPath::parse("/zport/dmd/Devices/Server/devices"))
        .expect("devices");
    store.delete_child(&devices, "db1").expect("delete");
    store
        .set_child(&devices, "db1", ObjectClass::Device)
        .expect("recreate");
    store.commit().expect("commit");

    let report = CatalogScrubber::silent(ScrubOptions::default())
        .scrub(&mut store, DEVICE_CATALOG)
        .expect("scrub");
    assert_eq!(report.remaining_stale(), 1);
    assert_eq!(report.state, CycleState::ExhaustedBudget);
}

#[test]
fn unreadable_target_counts_as_stale() {
    let mut store = MemoryStore::new();
    seed_demo(&mut store, false).expect("seed");
    let web1 = store
        .resolve_path(&PhysicalPath::parse("/zport/dmd/Devices/Server/devices/web1"))
        .expect("web1");
    store.abort();
    assert!(store.drop_record(web1.oid()));

    let report = CatalogScrubber::silent(repairing(3))
        .scrub(&mut store, DEVICE_CATALOG)
        .expect("scrub");
    assert_eq!(report.total_removed(), 1);
    assert_eq!(report.state, CycleState::Converged);
    assert!((report.removed_percentage() - 50.0).abs() < f64::EPSILON);
}

#[test]
fn large_catalog_renders_fifty_chunks() {
    let mut store = MemoryStore::new();
    let root = store.root().expect("root");
    let folder = store
        .set_child(&root, "Devices", ObjectClass::Folder)
        .expect("folder");
    for index in 0..120 {
        let device = store
            .set_child(&folder, &format!("dev{index:03}"), ObjectClass::Component)
            .expect("device");
        store.catalog("Devices.componentSearch", &format!("dev{index:03}"), &device);
    }
    store.commit().expect("commit");

    let sink = RecordingSink::default();
    let report = CatalogScrubber::new(ScrubOptions::default(), Box::new(sink.clone()))
        .scrub(&mut store, "Devices.componentSearch")
        .expect("scrub");
    assert_eq!(report.remaining_stale(), 0);

    // 120 entries in chunks of 3: forty chunk updates plus the opening bar.
    let updates = sink.updates();
    assert_eq!(updates.len(), 41);
    assert!(updates[0].contains("  0%"));
    assert!(updates[40].contains(" 80%"));
    let finished = sink.finished();
    assert_eq!(finished.len(), 1);
    assert!(finished[0].contains("100% [No issues]"));
}

#[test]
fn empty_catalogs_are_not_listed() {
    let mut store = MemoryStore::new();
    seed_demo(&mut store, false).expect("seed");
    for key in ["db1", "web1"] {
        store.uncatalog(DEVICE_CATALOG, key).expect("uncatalog");
    }
    store.commit().expect("commit");
    assert!(present_catalogs(&mut store).is_empty());
}
