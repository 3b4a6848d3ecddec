//! Rebuilds secondary catalogs from the object graph.
//!
//! Devices are indexed one at a time, together with their components, with a
//! commit after each device and a sync every [`SYNC_INTERVAL`] devices so the
//! transaction never grows with the size of the tree. The other organizers
//! are small and go through in a single transaction.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};
use crate::scan::{timestamp, NullSink, ProgressSink};
use crate::store::{NodeRef, ObjectStore};
use crate::types::{ObjectClass, PhysicalPath};

/// Catalog indexing every device by id.
pub const DEVICE_CATALOG: &str = "Devices.deviceSearch";

/// Catalog indexing device components by path.
pub const COMPONENT_CATALOG: &str = "Devices.componentSearch";

/// Devices indexed between two syncs.
pub const SYNC_INTERVAL: u64 = 10;

const LOG_INTERVAL: u64 = 100;

const DEVICES: &str = "Devices";

/// An organizer that can be reindexed, and the catalog it feeds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ReindexTarget {
    /// Name accepted by `--type`.
    pub name: &'static str,
    /// Physical path of the organizer.
    pub organizer: &'static str,
    /// Catalog rebuilt from it.
    pub catalog: &'static str,
}

/// Every supported organizer.
pub const REINDEX_TARGETS: [ReindexTarget; 5] = [
    ReindexTarget {
        name: DEVICES,
        organizer: "/zport/dmd/Devices",
        catalog: DEVICE_CATALOG,
    },
    ReindexTarget {
        name: "Events",
        organizer: "/zport/dmd/Events",
        catalog: "Events.eventClassSearch",
    },
    ReindexTarget {
        name: "Manufacturers",
        organizer: "/zport/dmd/Manufacturers",
        catalog: "Manufacturers.productSearch",
    },
    ReindexTarget {
        name: "Networks",
        organizer: "/zport/dmd/Networks",
        catalog: "Networks.ipSearch",
    },
    ReindexTarget {
        name: "Services",
        organizer: "/zport/dmd/Services",
        catalog: "Services.serviceSearch",
    },
];

impl ReindexTarget {
    /// Looks a target up by name.
    pub fn named(name: &str) -> Option<&'static ReindexTarget> {
        REINDEX_TARGETS.iter().find(|target| target.name == name)
    }
}

/// Outcome of reindexing one organizer.
#[derive(Clone, Debug, Serialize)]
pub struct ReindexReport {
    /// Target name.
    pub target: String,
    /// Catalog rebuilt.
    pub catalog: String,
    /// Objects indexed into `catalog`.
    pub indexed: u64,
    /// Components indexed into [`COMPONENT_CATALOG`].
    pub components: u64,
    /// Objects that could not be read or indexed.
    pub failures: u64,
    /// Syncs issued along the way, the closing one excluded.
    pub syncs: u64,
    /// Wall-clock duration.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ReindexReport {
    fn new(target: &ReindexTarget) -> Self {
        Self {
            target: target.name.to_string(),
            catalog: target.catalog.to_string(),
            indexed: 0,
            components: 0,
            failures: 0,
            syncs: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether every object was indexed.
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Walks an organizer and indexes what it finds.
pub struct Reindexer {
    sink: Box<dyn ProgressSink>,
}

impl Reindexer {
    /// Reindexer reporting to `sink`.
    pub fn new(sink: Box<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    /// Reindexer that prints nothing.
    pub fn silent() -> Self {
        Self::new(Box::new(NullSink))
    }

    /// Reindexes the organizer called `name`.
    ///
    /// Objects that cannot be read are logged and counted in
    /// [`ReindexReport::failures`]; the walk goes on without them.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidArgument`] for an unknown name,
    /// [`ScanError::InvalidPath`] when the organizer does not resolve, and
    /// store errors from commits and syncs.
    pub fn reindex(&mut self, store: &mut dyn ObjectStore, name: &str) -> Result<ReindexReport> {
        let target = ReindexTarget::named(name)
            .ok_or_else(|| ScanError::InvalidArgument(format!("unknown reindex type '{name}'")))?;
        let organizer = store
            .resolve_path(&PhysicalPath::parse(target.organizer))
            .map_err(|source| ScanError::InvalidPath {
                path: target.organizer.to_string(),
                source,
            })?;

        let started = Instant::now();
        info!(reindex_type = target.name, catalog = target.catalog, "reindex.begin");
        self.sink
            .update(&format!("[{}] Reindexing {} ... ", timestamp(), target.name));

        let mut report = ReindexReport::new(target);
        if target.name == DEVICES {
            self.reindex_devices(store, &organizer, &mut report)?;
        } else {
            reindex_organizer(store, &organizer, target.catalog, &mut report);
        }
        store.sync()?;
        store.commit()?;
        report.elapsed = started.elapsed();

        if report.is_clean() {
            self.sink.finish(&format!(
                "[{}] Reindexing {} ... finished",
                timestamp(),
                target.name
            ));
            info!(
                reindex_type = target.name,
                indexed = report.indexed,
                components = report.components,
                elapsed_secs = report.elapsed.as_secs_f64(),
                "reindex.completed"
            );
        } else {
            self.sink.finish(&format!(
                "[{}] Reindexing {} ... {} FAILED (check log file for details)",
                timestamp(),
                target.name,
                report.failures
            ));
            warn!(
                reindex_type = target.name,
                indexed = report.indexed,
                failures = report.failures,
                "reindex.completed_with_failures"
            );
        }
        Ok(report)
    }

    fn reindex_devices(
        &mut self,
        store: &mut dyn ObjectStore,
        organizer: &NodeRef,
        report: &mut ReindexReport,
    ) -> Result<()> {
        let mut devices = Vec::new();
        let mut queue = VecDeque::from([organizer.clone()]);
        while let Some(node) = queue.pop_front() {
            for child in children(store, &node, report) {
                if child.class() == ObjectClass::Device {
                    devices.push(child);
                } else if descends_into(child.class()) {
                    queue.push_back(child);
                }
            }
        }
        debug!(devices = devices.len(), "reindex.devices.found");

        for (position, device) in devices.iter().enumerate() {
            index_device(store, device, report);
            store.commit()?;

            let processed = position as u64 + 1;
            if processed % SYNC_INTERVAL == 0 {
                store.sync()?;
                report.syncs += 1;
                if processed % LOG_INTERVAL == 0 {
                    debug!(processed, "reindex.devices.progress");
                }
                self.sink.update(&format!(
                    "[{}] Reindexing {DEVICES} ... {processed:>8} devices processed",
                    timestamp()
                ));
            }
        }
        Ok(())
    }
}

fn index_device(store: &mut dyn ObjectStore, device: &NodeRef, report: &mut ReindexReport) {
    if let Err(fault) = store.index(DEVICE_CATALOG, device.name(), device) {
        report.failures += 1;
        error!(path = %device.path(), %fault, "reindex.device.failed");
        return;
    }
    report.indexed += 1;

    let mut queue = VecDeque::from([device.clone()]);
    while let Some(node) = queue.pop_front() {
        for child in children(store, &node, report) {
            if child.class() == ObjectClass::Component {
                match store.index(COMPONENT_CATALOG, &child.path().to_string(), &child) {
                    Ok(()) => report.components += 1,
                    Err(fault) => {
                        report.failures += 1;
                        error!(path = %child.path(), %fault, "reindex.component.failed");
                    }
                }
            }
            if descends_into(child.class()) {
                queue.push_back(child);
            }
        }
    }
}

fn reindex_organizer(
    store: &mut dyn ObjectStore,
    organizer: &NodeRef,
    catalog: &str,
    report: &mut ReindexReport,
) {
    let mut queue = VecDeque::from([organizer.clone()]);
    while let Some(node) = queue.pop_front() {
        for child in children(store, &node, report) {
            if !child.class().is_relationship() {
                match store.index(catalog, &child.path().to_string(), &child) {
                    Ok(()) => report.indexed += 1,
                    Err(fault) => {
                        report.failures += 1;
                        error!(path = %child.path(), %fault, "reindex.object.failed");
                    }
                }
            }
            if descends_into(child.class()) {
                queue.push_back(child);
            }
        }
    }
}

// Containing relationships hold their members; the others point elsewhere.
fn descends_into(class: ObjectClass) -> bool {
    class.is_containing() || (!class.is_relationship() && class != ObjectClass::Device)
}

fn children(
    store: &mut dyn ObjectStore,
    node: &NodeRef,
    report: &mut ReindexReport,
) -> Vec<NodeRef> {
    let names = match store.object_ids(node) {
        Ok(names) => names,
        Err(fault) => {
            report.failures += 1;
            error!(path = %node.path(), %fault, "reindex.children_unreadable");
            return Vec::new();
        }
    };
    let mut found = Vec::with_capacity(names.len());
    for name in names {
        match store.child(node, &name) {
            Ok(child) => found.push(child),
            Err(fault) => {
                report.failures += 1;
                error!(path = %node.path(), child = %name, %fault, "reindex.child_unreadable");
            }
        }
    }
    found
}
