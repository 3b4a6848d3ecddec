//! Identity, path, and classification types shared by the store and the scanner.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque storage identity of a persistent record.
///
/// Rendered as a zero-padded hexadecimal literal (`0x0683923b`), which is the
/// form administrators see in storage-layer error messages.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(pub u64);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Ordered sequence of path segments from the graph root.
///
/// The root is the single empty segment, so `/Devices/Server` is stored as
/// `["", "Devices", "Server"]`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPath(Vec<String>);

impl PhysicalPath {
    /// Path of the graph root.
    pub fn root() -> Self {
        Self(vec![String::new()])
    }

    /// Parses a user-supplied path.
    ///
    /// Accepts both `/`- and `.`-separated forms, and a leading `app` segment
    /// is dropped, so `app.Devices.Server`, `/Devices/Server` and
    /// `Devices/Server` all name the same node.
    pub fn parse(raw: &str) -> Self {
        let mut segments: Vec<&str> = raw
            .split(['.', '/'])
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.first() == Some(&"app") {
            segments.remove(0);
        }
        let mut path = Self::root();
        for segment in segments {
            path.0.push(segment.to_string());
        }
        path
    }

    /// Returns the path of the named child of this node.
    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.0.clone();
        segments.pop();
        Some(Self(segments))
    }

    /// Final segment (empty for the root).
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Whether this is the graph root.
    pub fn is_root(&self) -> bool {
        self.0.len() <= 1
    }

    /// Segments below the root, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().skip(1).map(String::as_str)
    }
}

impl fmt::Display for PhysicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        f.write_str(&self.0.join("/"))
    }
}

/// Kind of graph location a corruption was observed on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// The node itself (its child listing could not be read).
    Node,
    /// A single sub-object.
    Attribute,
    /// A relationship container.
    Relationship,
}

impl ObjectKind {
    /// Lower-case label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            ObjectKind::Node => "node",
            ObjectKind::Attribute => "attribute",
            ObjectKind::Relationship => "relationship",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three recognized corruption classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    /// Storage cannot materialize a record for a known identity.
    MissingRecord,
    /// A cached or optional child is absent.
    MissingAttribute,
    /// A lookup into a mapping-like structure failed.
    MissingKey,
}

/// Concrete class of a persistent object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    /// Generic organizer holding named children.
    Folder,
    /// Managed device; carries a cached poll status.
    Device,
    /// Operating-system sub-object of a device.
    OperatingSystem,
    /// Hardware sub-object of a device.
    DeviceHardware,
    /// Per-device component search cache.
    ComponentSearch,
    /// Per-user search index cache.
    SearchManager,
    /// Per-user settings object.
    UserSettings,
    /// Device component (interface, file system, ...).
    Component,
    /// Cached status value.
    Status,
    /// Containing to-many relationship; its members are traversed.
    ToManyContRelationship,
    /// Non-containing to-many relationship.
    ToManyRelationship,
    /// To-one relationship.
    ToOneRelationship,
    /// Mapping-backed member collection of a relationship.
    ObjectMap,
    /// List-backed member collection of a relationship.
    ObjectList,
}

impl ObjectClass {
    /// Whether objects of this class are relationships.
    pub fn is_relationship(self) -> bool {
        matches!(
            self,
            ObjectClass::ToManyContRelationship
                | ObjectClass::ToManyRelationship
                | ObjectClass::ToOneRelationship
        )
    }

    /// Whether the relationship's members are reached through it during a walk.
    pub fn is_containing(self) -> bool {
        matches!(self, ObjectClass::ToManyContRelationship)
    }

    /// Collection class backing a freshly created relationship of this class.
    pub fn default_collection(self) -> Option<ObjectClass> {
        match self {
            ObjectClass::ToManyContRelationship => Some(ObjectClass::ObjectMap),
            ObjectClass::ToManyRelationship | ObjectClass::ToOneRelationship => {
                Some(ObjectClass::ObjectList)
            }
            _ => None,
        }
    }

    /// Sub-objects created alongside a fresh instance of this class.
    pub fn default_children(self) -> &'static [(&'static str, ObjectClass)] {
        match self {
            ObjectClass::Device => &[
                ("os", ObjectClass::OperatingSystem),
                ("hw", ObjectClass::DeviceHardware),
                ("componentSearch", ObjectClass::ComponentSearch),
            ],
            ObjectClass::OperatingSystem => &[
                ("interfaces", ObjectClass::ToManyContRelationship),
                ("filesystems", ObjectClass::ToManyContRelationship),
            ],
            ObjectClass::DeviceHardware => &[("cpus", ObjectClass::ToManyContRelationship)],
            ObjectClass::UserSettings => &[("SearchManager", ObjectClass::SearchManager)],
            _ => &[],
        }
    }

    /// Cached status sub-objects created alongside a fresh instance.
    pub fn default_statuses(self) -> &'static [&'static str] {
        match self {
            ObjectClass::Device => &[crate::scan::POLL_STATUS_ATTRIBUTE],
            _ => &[],
        }
    }
}
