use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Fault;
use crate::types::{ObjectClass, Oid, PhysicalPath};

/// Persistent reference from one record to another.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Identity of the target record.
    pub oid: Oid,
    /// Class of the target, known without loading it.
    pub class: ObjectClass,
}

/// One stored object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    /// Concrete class.
    pub class: ObjectClass,
    /// Named children, relationships included.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Link>,
    /// Ids still listed by the object whose mapping entry is gone.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub orphan_ids: BTreeSet<String>,
    /// Backing member collection (relationships only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<Link>,
    /// Members (collection records only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, Link>,
    /// Cached status sub-objects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statuses: BTreeMap<String, Link>,
    /// Value held by a status record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl Record {
    /// Empty record of the given class.
    pub fn new(class: ObjectClass) -> Self {
        Self {
            class,
            children: BTreeMap::new(),
            orphan_ids: BTreeSet::new(),
            collection: None,
            members: BTreeMap::new(),
            statuses: BTreeMap::new(),
            value: None,
        }
    }
}

/// Catalog entry as persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Indexed path.
    pub path: PhysicalPath,
    /// Identity at indexing time.
    pub oid: Oid,
}

/// Complete committed state of a [`MemoryStore`](super::MemoryStore).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identity of the root record.
    pub root: Oid,
    /// Next identity to hand out.
    pub next_oid: u64,
    /// Every record by identity.
    pub records: BTreeMap<Oid, Record>,
    /// Secondary catalogs: catalog name to key to entry.
    #[serde(default)]
    pub catalogs: BTreeMap<String, BTreeMap<String, CatalogRecord>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        let mut records = BTreeMap::new();
        records.insert(Oid(1), Record::new(ObjectClass::Folder));
        Self {
            root: Oid(1),
            next_oid: 2,
            records,
            catalogs: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    /// Reads a snapshot file.
    pub fn load(path: &Path) -> Result<Self, Fault> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the snapshot next to `path` and renames it into place, so a
    /// crash never leaves a half-written file behind.
    pub fn save(&self, path: &Path) -> Result<(), Fault> {
        let staging = staging_path(path);
        let encoded = serde_json::to_vec_pretty(self)?;
        fs::write(&staging, encoded)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    pub(crate) fn allocate_oid(&mut self) -> Oid {
        let oid = Oid(self.next_oid);
        self.next_oid += 1;
        oid
    }

    /// Builds a fresh default instance of `class`, including its well-known
    /// sub-objects, and returns the link to it.
    pub(crate) fn construct(&mut self, class: ObjectClass) -> Link {
        let oid = self.allocate_oid();
        let mut record = Record::new(class);
        if let Some(collection_class) = class.default_collection() {
            record.collection = Some(self.insert_empty(collection_class));
        }
        for (name, child_class) in class.default_children() {
            let link = self.construct(*child_class);
            record.children.insert((*name).to_string(), link);
        }
        for name in class.default_statuses() {
            let link = self.insert_status(0);
            record.statuses.insert((*name).to_string(), link);
        }
        self.records.insert(oid, record);
        Link { oid, class }
    }

    pub(crate) fn insert_empty(&mut self, class: ObjectClass) -> Link {
        let oid = self.allocate_oid();
        self.records.insert(oid, Record::new(class));
        Link { oid, class }
    }

    pub(crate) fn insert_status(&mut self, value: i64) -> Link {
        let oid = self.allocate_oid();
        let mut status = Record::new(ObjectClass::Status);
        status.value = Some(value);
        self.records.insert(oid, status);
        Link {
            oid,
            class: ObjectClass::Status,
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("refscan"));
    name.push(".tmp");
    let mut staging = path.to_path_buf();
    staging.set_file_name(name);
    staging
}
