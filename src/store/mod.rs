#![forbid(unsafe_code)]

//! Store-handle interface consumed by the scanner.
//!
//! The scanner never holds materialized objects. Everything it keeps between
//! calls is a [`NodeRef`]: a physical path plus the identity and class the
//! parent's link recorded. Every store call re-derives what it needs from
//! that reference, so an `abort` between two calls never invalidates
//! traversal state.

mod memory;
mod snapshot;

use serde::Serialize;

use crate::error::Fault;
use crate::types::{ObjectClass, Oid, PhysicalPath};

/// Transactional in-memory object database.
pub use memory::MemoryStore;

/// Persisted form of a [`MemoryStore`].
pub use snapshot::{Link, Record, Snapshot};

/// Result of a single store dereference.
pub type FaultResult<T> = std::result::Result<T, Fault>;

/// Lightweight reference to a persistent object.
///
/// Holding a `NodeRef` does not keep the object resident; the identity and
/// class come from the parent's link, like an unactivated ghost.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct NodeRef {
    path: PhysicalPath,
    oid: Oid,
    class: ObjectClass,
}

impl NodeRef {
    /// Creates a reference from its parts.
    pub fn new(path: PhysicalPath, oid: Oid, class: ObjectClass) -> Self {
        Self { path, oid, class }
    }

    /// Physical path from the graph root.
    pub fn path(&self) -> &PhysicalPath {
        &self.path
    }

    /// Identity recorded in the parent's link.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Class recorded in the parent's link.
    pub fn class(&self) -> ObjectClass {
        self.class
    }

    /// Name of the object under its parent.
    pub fn name(&self) -> &str {
        self.path.name()
    }
}

/// One entry of a flat secondary catalog.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CatalogEntry {
    /// Catalog key (unique within the catalog).
    pub key: String,
    /// Physical path the entry points to.
    pub path: PhysicalPath,
    /// Identity recorded when the entry was indexed.
    pub oid: Oid,
}

/// Store handle: identity-addressed records, lazy child resolution and an
/// atomic transaction boundary.
///
/// Read operations take `&mut self` because resolving an object
/// materializes it into the current transaction.
pub trait ObjectStore {
    /// Reference to the graph root.
    fn root(&mut self) -> FaultResult<NodeRef>;

    /// Resolves a node by physical path, materializing every step.
    fn resolve_path(&mut self, path: &PhysicalPath) -> FaultResult<NodeRef>;

    /// Resolves a named child without materializing it.
    ///
    /// For relationship nodes the name is looked up among the members of
    /// the backing collection.
    fn child(&mut self, parent: &NodeRef, name: &str) -> FaultResult<NodeRef>;

    /// Every child id listed by the node, relationships included.
    fn object_ids(&mut self, node: &NodeRef) -> FaultResult<Vec<String>>;

    /// Names of the node's relationships.
    fn relationship_names(&mut self, node: &NodeRef) -> FaultResult<Vec<String>>;

    /// Materializes the node and returns its own identity.
    fn identity(&mut self, node: &NodeRef) -> FaultResult<Oid>;

    /// Invokes a relationship, materializing its backing collection.
    ///
    /// Returns the number of members.
    fn invoke(&mut self, relationship: &NodeRef) -> FaultResult<usize>;

    /// Identity of a relationship's backing collection, without loading it.
    ///
    /// `None` when the node has no backing collection.
    fn collection_identity(&mut self, relationship: &NodeRef) -> FaultResult<Option<Oid>>;

    /// Reads the value of a cached status sub-object.
    fn status(&mut self, node: &NodeRef, name: &str) -> FaultResult<i64>;

    /// Creates a fresh default instance of `class` under `parent`.
    fn set_child(&mut self, parent: &NodeRef, name: &str, class: ObjectClass)
        -> FaultResult<NodeRef>;

    /// Removes a named child link.
    fn delete_child(&mut self, parent: &NodeRef, name: &str) -> FaultResult<()>;

    /// Replaces a relationship's backing collection with an empty one of the
    /// same class and returns the new collection identity.
    fn replace_collection(&mut self, relationship: &NodeRef) -> FaultResult<Oid>;

    /// Replaces a cached status sub-object with a fresh one holding `value`.
    fn reset_status(&mut self, node: &NodeRef, name: &str, value: i64) -> FaultResult<()>;

    /// Flags the node as modified in the current transaction.
    fn mark_dirty(&mut self, node: &NodeRef) -> FaultResult<()>;

    /// Makes every mutation since the last boundary durable.
    fn commit(&mut self) -> FaultResult<()>;

    /// Discards every mutation and materialized object since the last
    /// boundary.
    fn abort(&mut self);

    /// Drops materialized objects and picks up changes committed elsewhere.
    fn sync(&mut self) -> FaultResult<()>;

    /// Indexes `node` under `key` in a catalog, creating the catalog on
    /// first use. The node is materialized, so an unreadable target fails.
    fn index(&mut self, catalog: &str, key: &str, node: &NodeRef) -> FaultResult<()>;

    /// Names of the secondary catalogs.
    fn catalog_names(&mut self) -> Vec<String>;

    /// Entries of one catalog.
    fn catalog_entries(&mut self, catalog: &str) -> FaultResult<Vec<CatalogEntry>>;

    /// Removes one entry from a catalog.
    fn uncatalog(&mut self, catalog: &str, key: &str) -> FaultResult<()>;
}
