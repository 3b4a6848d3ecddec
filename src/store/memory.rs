use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{Fault, Result, ScanError};
use crate::store::snapshot::{CatalogRecord, Link, Record, Snapshot};
use crate::store::{CatalogEntry, FaultResult, NodeRef, ObjectStore};
use crate::types::{ObjectClass, Oid, PhysicalPath};

const COLLECTION_ATTRIBUTE: &str = "_objects";

/// Transactional in-memory object database with optional file persistence.
///
/// Mutations go to a copy-on-write working state that `commit` promotes and
/// `abort` throws away. Every record read is tracked as resident until the
/// next transaction boundary, which makes the effect of periodic aborts
/// observable through [`MemoryStore::resident`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Snapshot,
    working: Option<Snapshot>,
    resident: FxHashSet<Oid>,
    dirty: FxHashSet<Oid>,
    injected: FxHashMap<Oid, Fault>,
    backing: Option<PathBuf>,
    commits: u64,
    aborts: u64,
}

impl MemoryStore {
    /// Empty store holding only the root folder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store over an existing snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            committed: snapshot,
            ..Self::default()
        }
    }

    /// Opens a snapshot file; every commit rewrites it.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::MissingStore`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScanError::MissingStore(path.to_path_buf()));
        }
        let snapshot = Snapshot::load(path)?;
        debug!(path = %path.display(), records = snapshot.records.len(), "store.open");
        Ok(Self {
            committed: snapshot,
            backing: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Creates a new snapshot file holding only the root folder.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            backing: Some(path.to_path_buf()),
            ..Self::default()
        };
        store.committed.save(path)?;
        Ok(store)
    }

    /// Committed state.
    pub fn snapshot(&self) -> &Snapshot {
        &self.committed
    }

    /// Number of commits since the store was opened.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Number of aborts since the store was opened.
    pub fn aborts(&self) -> u64 {
        self.aborts
    }

    /// Objects materialized since the last transaction boundary.
    pub fn resident(&self) -> usize {
        self.resident.len()
    }

    /// Whether uncommitted mutations are pending.
    pub fn has_pending_changes(&self) -> bool {
        self.working.is_some()
    }

    /// Deletes the record behind `oid` from storage, leaving every link to it
    /// dangling. Returns whether a record was removed.
    pub fn drop_record(&mut self, oid: Oid) -> bool {
        let mut removed = self.committed.records.remove(&oid).is_some();
        if let Some(working) = self.working.as_mut() {
            removed |= working.records.remove(&oid).is_some();
        }
        self.resident.remove(&oid);
        removed
    }

    /// Drops the mapping entry for `name` while the parent keeps listing it.
    pub fn orphan_key(&mut self, parent: &NodeRef, name: &str) -> bool {
        let Some(record) = self.committed.records.get_mut(&parent.oid()) else {
            return false;
        };
        if record.children.remove(name).is_none() {
            return false;
        }
        record.orphan_ids.insert(name.to_string());
        true
    }

    /// Removes the value of a cached status sub-object, keeping its record.
    pub fn clear_status(&mut self, node: &NodeRef, name: &str) -> bool {
        let Some(link) = self
            .committed
            .records
            .get(&node.oid())
            .and_then(|record| record.statuses.get(name))
            .copied()
        else {
            return false;
        };
        match self.committed.records.get_mut(&link.oid) {
            Some(status) => {
                status.value = None;
                true
            }
            None => false,
        }
    }

    /// Makes every load of `oid` fail with `fault`.
    pub fn inject_fault(&mut self, oid: Oid, fault: Fault) {
        self.injected.insert(oid, fault);
    }

    /// Indexes `node` under `key` in a catalog (pending until commit).
    pub fn catalog(&mut self, catalog: &str, key: &str, node: &NodeRef) {
        self.working_mut()
            .catalogs
            .entry(catalog.to_string())
            .or_default()
            .insert(
                key.to_string(),
                CatalogRecord {
                    path: node.path().clone(),
                    oid: node.oid(),
                },
            );
    }

    fn view(&self) -> &Snapshot {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    fn working_mut(&mut self) -> &mut Snapshot {
        let committed = &self.committed;
        self.working.get_or_insert_with(|| committed.clone())
    }

    fn load(&mut self, oid: Oid) -> FaultResult<Record> {
        if let Some(fault) = self.injected.get(&oid) {
            return Err(fault.clone());
        }
        let record = self
            .view()
            .records
            .get(&oid)
            .cloned()
            .ok_or(Fault::MissingRecord(oid))?;
        self.resident.insert(oid);
        Ok(record)
    }

    fn collection_link(record: &Record) -> FaultResult<Link> {
        record
            .collection
            .ok_or_else(|| Fault::MissingAttribute(COLLECTION_ATTRIBUTE.to_string()))
    }

    fn working_record(&mut self, oid: Oid) -> FaultResult<&mut Record> {
        self.working_mut()
            .records
            .get_mut(&oid)
            .ok_or(Fault::MissingRecord(oid))
    }
}

impl ObjectStore for MemoryStore {
    fn root(&mut self) -> FaultResult<NodeRef> {
        let oid = self.view().root;
        let record = self.load(oid)?;
        Ok(NodeRef::new(PhysicalPath::root(), oid, record.class))
    }

    fn resolve_path(&mut self, path: &PhysicalPath) -> FaultResult<NodeRef> {
        let mut node = self.root()?;
        let segments: Vec<String> = path.segments().map(str::to_string).collect();
        for segment in &segments {
            node = self.child(&node, segment)?;
            self.identity(&node)?;
        }
        Ok(node)
    }

    fn child(&mut self, parent: &NodeRef, name: &str) -> FaultResult<NodeRef> {
        let record = self.load(parent.oid())?;
        let link = if record.class.is_relationship() {
            let collection = self.load(Self::collection_link(&record)?.oid)?;
            collection.members.get(name).copied()
        } else {
            record.children.get(name).copied()
        };
        let link = link.ok_or_else(|| Fault::MissingKey(name.to_string()))?;
        Ok(NodeRef::new(parent.path().join(name), link.oid, link.class))
    }

    fn object_ids(&mut self, node: &NodeRef) -> FaultResult<Vec<String>> {
        let record = self.load(node.oid())?;
        if record.class.is_relationship() {
            let collection = self.load(Self::collection_link(&record)?.oid)?;
            return Ok(collection.members.keys().cloned().collect());
        }
        let mut ids: Vec<String> = record.children.keys().cloned().collect();
        ids.extend(record.orphan_ids.iter().cloned());
        Ok(ids)
    }

    fn relationship_names(&mut self, node: &NodeRef) -> FaultResult<Vec<String>> {
        let record = self.load(node.oid())?;
        Ok(record
            .children
            .iter()
            .filter(|(_, link)| link.class.is_relationship())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn identity(&mut self, node: &NodeRef) -> FaultResult<Oid> {
        self.load(node.oid())?;
        Ok(node.oid())
    }

    fn invoke(&mut self, relationship: &NodeRef) -> FaultResult<usize> {
        let record = self.load(relationship.oid())?;
        if !record.class.is_relationship() {
            return Err(Fault::Other(format!(
                "{} is not a relationship",
                relationship.path()
            )));
        }
        let collection = self.load(Self::collection_link(&record)?.oid)?;
        Ok(collection.members.len())
    }

    fn collection_identity(&mut self, relationship: &NodeRef) -> FaultResult<Option<Oid>> {
        let record = self.load(relationship.oid())?;
        Ok(record.collection.map(|link| link.oid))
    }

    fn status(&mut self, node: &NodeRef, name: &str) -> FaultResult<i64> {
        let record = self.load(node.oid())?;
        let link = record
            .statuses
            .get(name)
            .copied()
            .ok_or_else(|| Fault::MissingAttribute(name.to_string()))?;
        let status = self.load(link.oid)?;
        status
            .value
            .ok_or_else(|| Fault::MissingAttribute("status".to_string()))
    }

    fn set_child(
        &mut self,
        parent: &NodeRef,
        name: &str,
        class: ObjectClass,
    ) -> FaultResult<NodeRef> {
        let parent_record = self.load(parent.oid())?;
        let link = self.working_mut().construct(class);
        if parent_record.class.is_relationship() {
            let collection = Self::collection_link(&parent_record)?;
            self.working_record(collection.oid)?
                .members
                .insert(name.to_string(), link);
        } else {
            let record = self.working_record(parent.oid())?;
            record.orphan_ids.remove(name);
            record.children.insert(name.to_string(), link);
        }
        self.dirty.insert(parent.oid());
        Ok(NodeRef::new(parent.path().join(name), link.oid, class))
    }

    fn delete_child(&mut self, parent: &NodeRef, name: &str) -> FaultResult<()> {
        let parent_record = self.load(parent.oid())?;
        let removed = if parent_record.class.is_relationship() {
            let collection = Self::collection_link(&parent_record)?;
            self.working_record(collection.oid)?
                .members
                .remove(name)
                .is_some()
        } else {
            let record = self.working_record(parent.oid())?;
            let linked = record.children.remove(name).is_some();
            record.orphan_ids.remove(name) || linked
        };
        if !removed {
            return Err(Fault::MissingKey(name.to_string()));
        }
        self.dirty.insert(parent.oid());
        Ok(())
    }

    fn replace_collection(&mut self, relationship: &NodeRef) -> FaultResult<Oid> {
        let record = self.load(relationship.oid())?;
        let class = record
            .collection
            .map(|link| link.class)
            .or_else(|| record.class.default_collection())
            .ok_or_else(|| {
                Fault::Other(format!("{} has no member collection", relationship.path()))
            })?;
        let link = self.working_mut().insert_empty(class);
        self.working_record(relationship.oid())?.collection = Some(link);
        self.dirty.insert(relationship.oid());
        Ok(link.oid)
    }

    fn reset_status(&mut self, node: &NodeRef, name: &str, value: i64) -> FaultResult<()> {
        self.load(node.oid())?;
        let link = self.working_mut().insert_status(value);
        self.working_record(node.oid())?
            .statuses
            .insert(name.to_string(), link);
        self.dirty.insert(node.oid());
        Ok(())
    }

    fn mark_dirty(&mut self, node: &NodeRef) -> FaultResult<()> {
        self.load(node.oid())?;
        self.working_mut();
        self.dirty.insert(node.oid());
        Ok(())
    }

    fn commit(&mut self) -> FaultResult<()> {
        if let Some(working) = self.working.take() {
            if let Some(path) = self.backing.as_ref() {
                working.save(path)?;
            }
            self.committed = working;
        }
        self.commits += 1;
        debug!(
            commits = self.commits,
            dirty = self.dirty.len(),
            "store.commit"
        );
        self.dirty.clear();
        Ok(())
    }

    fn abort(&mut self) {
        self.working = None;
        self.dirty.clear();
        self.resident.clear();
        self.aborts += 1;
    }

    fn sync(&mut self) -> FaultResult<()> {
        self.resident.clear();
        if self.working.is_none() {
            if let Some(path) = self.backing.as_ref() {
                self.committed = Snapshot::load(path)?;
            }
        }
        Ok(())
    }

    fn index(&mut self, catalog: &str, key: &str, node: &NodeRef) -> FaultResult<()> {
        self.load(node.oid())?;
        self.catalog(catalog, key, node);
        Ok(())
    }

    fn catalog_names(&mut self) -> Vec<String> {
        self.view().catalogs.keys().cloned().collect()
    }

    fn catalog_entries(&mut self, catalog: &str) -> FaultResult<Vec<CatalogEntry>> {
        let entries = self
            .view()
            .catalogs
            .get(catalog)
            .ok_or_else(|| Fault::MissingKey(catalog.to_string()))?;
        Ok(entries
            .iter()
            .map(|(key, entry)| CatalogEntry {
                key: key.clone(),
                path: entry.path.clone(),
                oid: entry.oid,
            })
            .collect())
    }

    fn uncatalog(&mut self, catalog: &str, key: &str) -> FaultResult<()> {
        let entries = self
            .working_mut()
            .catalogs
            .get_mut(catalog)
            .ok_or_else(|| Fault::MissingKey(catalog.to_string()))?;
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Fault::MissingKey(key.to_string()))
    }
}
