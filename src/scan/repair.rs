//! Repair strategies for known corruption patterns.
//!
//! A strategy first decides, without mutating anything, whether a corruption
//! signature is one it was built for. Only then does it hand back a
//! [`RepairAction`], which performs the store mutations and commits them.

use std::fmt;

use serde::Serialize;
use tracing::{error, info};

use crate::error::Fault;
use crate::store::{FaultResult, NodeRef, ObjectStore};
use crate::types::{CorruptionKind, ObjectClass, ObjectKind, Oid, PhysicalPath};

/// Transient description of one failed dereference.
#[derive(Clone, Debug, Serialize)]
pub struct CorruptionSignature {
    /// The fault raised by the store.
    #[serde(serialize_with = "serialize_fault")]
    pub fault: Fault,
    /// What kind of location failed.
    pub kind: ObjectKind,
    /// Name of the failing child under its parent.
    pub name: String,
    /// Path of the parent owning the child.
    pub parent: PhysicalPath,
}

impl CorruptionSignature {
    /// Recognized corruption class, if any.
    pub fn corruption(&self) -> Option<CorruptionKind> {
        self.fault.kind()
    }

    /// Identity the storage layer could not read.
    pub fn oid(&self) -> Option<Oid> {
        self.fault.oid()
    }
}

impl fmt::Display for CorruptionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} on {} '{}' of {}",
            self.fault.label(),
            self.fault,
            self.kind,
            self.name,
            self.parent
        )
    }
}

fn serialize_fault<S: serde::Serializer>(fault: &Fault, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&fault.to_string())
}

type RepairFn = Box<dyn FnOnce(&mut dyn ObjectStore) -> FaultResult<()>>;

/// Deferred remediation bound to one corruption signature.
pub struct RepairAction {
    label: String,
    run: RepairFn,
}

impl RepairAction {
    /// Wraps a remediation closure.
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(&mut dyn ObjectStore) -> FaultResult<()> + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    /// Human-readable description.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Performs the remediation, committing as it goes.
    pub fn run(self, store: &mut dyn ObjectStore) -> FaultResult<()> {
        (self.run)(store)
    }
}

impl fmt::Debug for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepairAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Matcher for one known corruption pattern.
pub trait RepairStrategy {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Returns the action that fixes `signature`, or `None` when this
    /// strategy does not recognize it. Must not mutate the store.
    fn can_repair(
        &self,
        signature: &CorruptionSignature,
        store: &mut dyn ObjectStore,
    ) -> Option<RepairAction>;
}

/// Replaces the unreadable member collection of a relationship with an
/// empty one of the same kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContainerRepair;

impl RepairStrategy for ContainerRepair {
    fn name(&self) -> &'static str {
        "container"
    }

    fn can_repair(
        &self,
        signature: &CorruptionSignature,
        store: &mut dyn ObjectStore,
    ) -> Option<RepairAction> {
        let expected = signature.oid()?;
        let parent = store.resolve_path(&signature.parent).ok()?;
        let relationship = store.child(&parent, &signature.name).ok()?;
        if !relationship.class().is_relationship() {
            return None;
        }
        let current = match store.collection_identity(&relationship) {
            Ok(Some(oid)) => oid,
            Ok(None) => {
                error!(
                    path = %relationship.path(),
                    "repair.container.no_collection"
                );
                return None;
            }
            Err(_) => return None,
        };
        if current != expected {
            error!(
                path = %relationship.path(),
                expected = %expected,
                current = %current,
                "repair.container.oid_mismatch"
            );
            return None;
        }
        Some(RepairAction::new(
            format!("replace member collection of {}", relationship.path()),
            move |store| {
                info!(
                    path = %relationship.path(),
                    oid = %current,
                    "repair.container.apply"
                );
                store.replace_collection(&relationship)?;
                store.mark_dirty(&parent)?;
                store.commit()
            },
        ))
    }
}

/// Deletes and recreates a well-known singleton child whose record is gone.
#[derive(Clone, Copy, Debug)]
pub struct NamedSingletonRepair {
    child: &'static str,
    class: ObjectClass,
    check_class: bool,
    remodel: bool,
}

impl NamedSingletonRepair {
    /// Strategy for an arbitrary well-known child.
    ///
    /// With `check_class`, the link must also record `class`.
    pub const fn new(child: &'static str, class: ObjectClass, check_class: bool) -> Self {
        Self {
            child,
            class,
            check_class,
            remodel: false,
        }
    }

    /// Per-user search index cache.
    pub const fn search_manager() -> Self {
        Self::new("SearchManager", ObjectClass::SearchManager, true)
    }

    /// Per-device component search cache.
    pub const fn component_search() -> Self {
        Self::new("componentSearch", ObjectClass::ComponentSearch, false)
    }

    /// Operating-system sub-object of a device.
    pub const fn operating_system() -> Self {
        Self::new("os", ObjectClass::OperatingSystem, false).needs_remodel()
    }

    /// Hardware sub-object of a device.
    pub const fn hardware() -> Self {
        Self::new("hw", ObjectClass::DeviceHardware, false).needs_remodel()
    }

    const fn needs_remodel(mut self) -> Self {
        self.remodel = true;
        self
    }

    /// Name of the child this strategy handles.
    pub fn child(&self) -> &'static str {
        self.child
    }
}

impl RepairStrategy for NamedSingletonRepair {
    fn name(&self) -> &'static str {
        self.child
    }

    fn can_repair(
        &self,
        signature: &CorruptionSignature,
        store: &mut dyn ObjectStore,
    ) -> Option<RepairAction> {
        if signature.name != self.child {
            return None;
        }
        let expected = signature.oid()?;
        let parent = store.resolve_path(&signature.parent).ok()?;
        let child = store.child(&parent, self.child).ok()?;
        if self.check_class && child.class() != self.class {
            return None;
        }
        if child.oid() != expected {
            return None;
        }
        let (name, class, remodel) = (self.child, self.class, self.remodel);
        Some(RepairAction::new(
            format!("recreate '{}' under {}", name, parent.path()),
            move |store| recreate_singleton(store, &parent, name, class, remodel),
        ))
    }
}

// Deletion and recreation are separate commit points: a failed rebuild
// leaves the parent without the child, never with the broken link.
fn recreate_singleton(
    store: &mut dyn ObjectStore,
    parent: &NodeRef,
    name: &str,
    class: ObjectClass,
    remodel: bool,
) -> FaultResult<()> {
    info!(
        path = %parent.path(),
        child = name,
        remodel,
        "repair.singleton.apply"
    );
    if let Err(err) = store.delete_child(parent, name) {
        error!(path = %parent.path(), child = name, %err, "repair.singleton.delete_failed");
    }
    store.commit()?;
    if let Err(err) = store.set_child(parent, name, class) {
        error!(path = %parent.path(), child = name, %err, "repair.singleton.create_failed");
    }
    store.commit()
}

/// Ordered list of strategies; the first match wins.
pub struct RepairRegistry {
    strategies: Vec<Box<dyn RepairStrategy>>,
}

impl Default for RepairRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl RepairRegistry {
    /// Registry with no strategies.
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The known strategies in their declared order.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ContainerRepair));
        registry.register(Box::new(NamedSingletonRepair::search_manager()));
        registry.register(Box::new(NamedSingletonRepair::component_search()));
        registry.register(Box::new(NamedSingletonRepair::operating_system()));
        registry.register(Box::new(NamedSingletonRepair::hardware()));
        registry
    }

    /// Appends a strategy after the existing ones.
    pub fn register(&mut self, strategy: Box<dyn RepairStrategy>) {
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First action offered for `signature`, with the offering strategy.
    pub fn find(
        &self,
        signature: &CorruptionSignature,
        store: &mut dyn ObjectStore,
    ) -> Option<(&'static str, RepairAction)> {
        self.strategies.iter().find_map(|strategy| {
            strategy
                .can_repair(signature, store)
                .map(|action| (strategy.name(), action))
        })
    }
}
