use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{Fault, Result, ScanError};
use crate::scan::counters::Counters;
use crate::scan::options::ScanOptions;
use crate::scan::progress::ProgressReporter;
use crate::scan::repair::{CorruptionSignature, RepairRegistry};
use crate::scan::window::TransactionWindow;
use crate::scan::POLL_STATUS_ATTRIBUTE;
use crate::store::{FaultResult, NodeRef, ObjectStore};
use crate::types::{CorruptionKind, ObjectClass, ObjectKind};

const MAX_FINDINGS: usize = 32;

/// Outcome of one full pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ScanResult {
    /// 1-based cycle number.
    pub cycle: u32,
    /// Items scanned.
    pub items: u64,
    /// Corruptions detected.
    pub errors: u64,
    /// Repairs attempted.
    pub repairs: u64,
}

/// Breadth-first walker over a partially corrupt object graph.
///
/// The queue holds [`NodeRef`]s only, so the periodic aborts issued through
/// the [`TransactionWindow`] never invalidate pending work.
pub struct GraphWalker {
    options: ScanOptions,
    registry: RepairRegistry,
    counters: Counters,
    progress: ProgressReporter,
    window: TransactionWindow,
    findings: Vec<CorruptionSignature>,
}

impl GraphWalker {
    /// Walker using `registry` when `options.repair` is set.
    pub fn new(options: ScanOptions, registry: RepairRegistry, progress: ProgressReporter) -> Self {
        let window = TransactionWindow::new(options.unlimited_memory);
        Self {
            options,
            registry,
            counters: Counters::default(),
            progress,
            window,
            findings: Vec::new(),
        }
    }

    /// Counters of the current (or last) pass.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Options in effect.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Transaction window state.
    pub fn window(&self) -> &TransactionWindow {
        &self.window
    }

    /// Progress reporter state.
    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// First corruptions seen during the current (or last) pass.
    pub fn findings(&self) -> &[CorruptionSignature] {
        &self.findings
    }

    /// Runs one full pass from `root`, with all counters reset.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Severe`] when invoking a relationship raises a
    /// severe platform fault; the pass stops immediately.
    pub fn walk(
        &mut self,
        store: &mut dyn ObjectStore,
        root: &NodeRef,
        cycle: u32,
    ) -> Result<ScanResult> {
        self.counters.reset();
        self.findings.clear();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(node) = queue.pop_front() {
            self.count_item(store, cycle);

            if node.class() == ObjectClass::Device {
                self.check_poll_status(store, &node, cycle);
            }

            let (relationships, attributes) = match partition_children(store, &node) {
                Ok(edges) => edges,
                Err(fault) => {
                    self.children_unreadable(store, &node, fault);
                    continue;
                }
            };

            for name in &relationships {
                self.visit_relationship(store, &node, name, cycle, &mut queue)?;
            }
            for name in &attributes {
                self.visit_attribute(store, &node, name, cycle, &mut queue);
            }
        }

        self.window.release(store);
        self.progress.finish(cycle, &self.counters);
        Ok(ScanResult {
            cycle,
            items: self.counters.items.value(),
            errors: self.counters.errors.value(),
            repairs: self.counters.repairs.value(),
        })
    }

    fn count_item(&mut self, store: &mut dyn ObjectStore, cycle: u32) {
        let items = self.counters.items.increment();
        if items % self.options.progress_interval.max(1) == 0 {
            self.window.release(store);
            self.progress.render(cycle, &self.counters);
        }
    }

    fn check_poll_status(&mut self, store: &mut dyn ObjectStore, node: &NodeRef, cycle: u32) {
        self.count_item(store, cycle);
        let fault = match store.status(node, POLL_STATUS_ATTRIBUTE) {
            Ok(_) => return,
            Err(fault) => fault,
        };
        let fixable = matches!(
            fault.kind(),
            Some(CorruptionKind::MissingRecord | CorruptionKind::MissingAttribute)
        );
        self.record(CorruptionSignature {
            fault,
            kind: ObjectKind::Attribute,
            name: POLL_STATUS_ATTRIBUTE.to_string(),
            parent: node.path().clone(),
        });
        if !(fixable && self.options.repair) {
            return;
        }
        self.counters.repairs.increment();
        info!(path = %node.path(), attribute = POLL_STATUS_ATTRIBUTE, "repair.status.apply");
        let outcome = store
            .reset_status(node, POLL_STATUS_ATTRIBUTE, 0)
            .and_then(|_| store.commit());
        if let Err(err) = outcome {
            error!(path = %node.path(), %err, "repair.status.failed");
            store.abort();
        }
    }

    fn children_unreadable(&mut self, store: &mut dyn ObjectStore, node: &NodeRef, fault: Fault) {
        if fault.kind().is_none() {
            error!(
                critical = true,
                path = %node.path(),
                %fault,
                "scan.children.unclassified"
            );
            return;
        }
        let Some(parent) = node.path().parent() else {
            self.record(CorruptionSignature {
                fault,
                kind: ObjectKind::Node,
                name: String::new(),
                parent: node.path().clone(),
            });
            return;
        };
        let signature = CorruptionSignature {
            fault,
            kind: ObjectKind::Node,
            name: node.name().to_string(),
            parent,
        };
        self.record(signature.clone());
        self.dispatch(store, &signature);
    }

    fn visit_relationship(
        &mut self,
        store: &mut dyn ObjectStore,
        node: &NodeRef,
        name: &str,
        cycle: u32,
        queue: &mut VecDeque<NodeRef>,
    ) -> Result<()> {
        let outcome = store
            .child(node, name)
            .and_then(|relationship| store.invoke(&relationship).map(|_| relationship));

        if let Err(Fault::Severe(message)) = &outcome {
            error!(
                critical = true,
                path = %node.path(),
                relationship = name,
                %message,
                "scan.relationship.severe"
            );
            return Err(ScanError::Severe {
                path: node.path().clone(),
                name: name.to_string(),
                message: message.clone(),
            });
        }
        self.count_item(store, cycle);

        match outcome {
            Ok(relationship) => {
                if relationship.class().is_containing() {
                    queue.push_back(relationship);
                }
            }
            Err(fault) if fault.kind().is_some() => {
                let signature = CorruptionSignature {
                    fault,
                    kind: ObjectKind::Relationship,
                    name: name.to_string(),
                    parent: node.path().clone(),
                };
                self.record(signature.clone());
                self.dispatch(store, &signature);
            }
            Err(fault) => {
                error!(
                    critical = true,
                    path = %node.path(),
                    relationship = name,
                    %fault,
                    "scan.relationship.unclassified"
                );
            }
        }
        Ok(())
    }

    fn visit_attribute(
        &mut self,
        store: &mut dyn ObjectStore,
        node: &NodeRef,
        name: &str,
        cycle: u32,
        queue: &mut VecDeque<NodeRef>,
    ) {
        self.count_item(store, cycle);
        if node.path().is_root() && name == self.options.session_folder {
            return;
        }

        let outcome = store
            .child(node, name)
            .and_then(|child| store.identity(&child).map(|_| child));

        match outcome {
            Ok(child) => queue.push_back(child),
            Err(fault) if fault.kind().is_some() => {
                let signature = CorruptionSignature {
                    fault,
                    kind: ObjectKind::Attribute,
                    name: name.to_string(),
                    parent: node.path().clone(),
                };
                self.record(signature.clone());
                self.dispatch(store, &signature);
            }
            // Unlike the relationship branch, severe faults here are logged
            // and the walk goes on.
            Err(fault) => {
                error!(
                    critical = true,
                    path = %node.path(),
                    attribute = name,
                    %fault,
                    "scan.attribute.unclassified"
                );
            }
        }
    }

    fn record(&mut self, signature: CorruptionSignature) {
        self.counters.errors.increment();
        error!(critical = true, corruption = %signature, "scan.corruption");
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(signature);
        }
    }

    fn dispatch(&mut self, store: &mut dyn ObjectStore, signature: &CorruptionSignature) {
        if !self.options.repair {
            return;
        }
        let Some((strategy, action)) = self.registry.find(signature, store) else {
            debug!(corruption = %signature, "scan.repair.no_strategy");
            return;
        };
        self.counters.repairs.increment();
        info!(strategy, action = action.label(), "scan.repair.dispatch");
        if let Err(err) = action.run(store) {
            error!(strategy, %err, "scan.repair.failed");
            store.abort();
        }
    }
}

fn partition_children(
    store: &mut dyn ObjectStore,
    node: &NodeRef,
) -> FaultResult<(BTreeSet<String>, BTreeSet<String>)> {
    let names: BTreeSet<String> = store.object_ids(node)?.into_iter().collect();
    let relationships: BTreeSet<String> = store.relationship_names(node)?.into_iter().collect();
    let attributes = names.difference(&relationships).cloned().collect();
    Ok((relationships, attributes))
}
