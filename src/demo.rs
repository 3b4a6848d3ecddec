//! Demo object database used by `refscan seed-demo` and the tests.

use serde::Serialize;

use crate::error::{Result, ScanError};
use crate::scan::{DEFAULT_SESSION_FOLDER, POLL_STATUS_ATTRIBUTE};
use crate::store::{MemoryStore, NodeRef, ObjectStore};
use crate::types::{ObjectClass, Oid};

pub use crate::reindex::DEVICE_CATALOG;

/// What [`seed_demo`] wrote.
#[derive(Clone, Debug, Serialize)]
pub struct DemoSummary {
    /// Records in the committed store.
    pub records: usize,
    /// Corruptions injected, one line each.
    pub corruptions: Vec<String>,
}

/// Populates `store` with a small device tree.
///
/// With `corrupt`, one instance of every known corruption pattern is
/// injected afterwards, plus a stale catalog entry.
pub fn seed_demo(store: &mut MemoryStore, corrupt: bool) -> Result<DemoSummary> {
    let root = store.root()?;
    let zport = store.set_child(&root, "zport", ObjectClass::Folder)?;
    store.set_child(&root, DEFAULT_SESSION_FOLDER, ObjectClass::Folder)?;
    let dmd = store.set_child(&zport, "dmd", ObjectClass::Folder)?;
    let devices = store.set_child(&dmd, "Devices", ObjectClass::Folder)?;
    let server = store.set_child(&devices, "Server", ObjectClass::Folder)?;
    let members = store.set_child(&server, "devices", ObjectClass::ToManyContRelationship)?;
    let web1 = store.set_child(&members, "web1", ObjectClass::Device)?;
    let db1 = store.set_child(&members, "db1", ObjectClass::Device)?;
    let manufacturers = store.set_child(&dmd, "Manufacturers", ObjectClass::Folder)?;
    for vendor in ["Cisco", "Juniper"] {
        store.set_child(&manufacturers, vendor, ObjectClass::Folder)?;
    }
    let users = store.set_child(&dmd, "ZenUsers", ObjectClass::Folder)?;
    let admin = store.set_child(&users, "admin", ObjectClass::UserSettings)?;
    store.commit()?;

    let web_os = store.child(&web1, "os")?;
    let interfaces = store.child(&web_os, "interfaces")?;
    store.set_child(&interfaces, "eth0", ObjectClass::Component)?;
    store.set_child(&interfaces, "eth1", ObjectClass::Component)?;
    store.catalog(DEVICE_CATALOG, "web1", &web1);
    store.catalog(DEVICE_CATALOG, "db1", &db1);
    store.commit()?;

    let mut corruptions = Vec::new();
    if corrupt {
        let search = store.child(&web1, "componentSearch")?;
        drop_record(store, &search, &mut corruptions)?;

        let db_os = store.child(&db1, "os")?;
        let db_interfaces = store.child(&db_os, "interfaces")?;
        let collection = store
            .collection_identity(&db_interfaces)?
            .ok_or_else(|| ScanError::InvalidArgument("relationship without collection".into()))?;
        store.drop_record(collection);
        corruptions.push(format!(
            "member collection {collection} of {}",
            db_interfaces.path()
        ));

        let manager = store.child(&admin, "SearchManager")?;
        drop_record(store, &manager, &mut corruptions)?;

        store.clear_status(&web1, POLL_STATUS_ATTRIBUTE);
        corruptions.push(format!("{POLL_STATUS_ATTRIBUTE} of {}", web1.path()));

        let ghost = NodeRef::new(members.path().join("ghost"), Oid(u64::MAX >> 1), ObjectClass::Device);
        store.catalog(DEVICE_CATALOG, "ghost", &ghost);
        store.commit()?;
        corruptions.push(format!("stale catalog entry for {}", ghost.path()));
    }
    store.abort();

    Ok(DemoSummary {
        records: store.snapshot().records.len(),
        corruptions,
    })
}

fn drop_record(
    store: &mut MemoryStore,
    node: &NodeRef,
    corruptions: &mut Vec<String>,
) -> Result<()> {
    if !store.drop_record(node.oid()) {
        return Err(ScanError::InvalidArgument(format!(
            "no record behind {}",
            node.path()
        )));
    }
    corruptions.push(format!("record {} of {}", node.oid(), node.path()));
    Ok(())
}
