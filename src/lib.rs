//! Integrity scanner and repairer for lazily loaded persistent object graphs.
//!
//! The scanner walks the graph breadth-first from a starting path, counting
//! every dereference that fails with a recognized corruption class and, in
//! repair mode, dispatching it to the first matching repair strategy. Passes
//! repeat until one converges or the cycle budget runs out.

#![warn(missing_docs)]

/// File-backed tool configuration.
pub mod config;
/// Demo object database with injectable corruption.
pub mod demo;
/// Error types.
pub mod error;
/// End-of-run status events.
pub mod events;
/// Single-instance run guard.
pub mod lock;
/// Log file subscriber setup.
pub mod logging;
/// Catalog rebuilding from the graph.
pub mod reindex;
/// Graph scanning and repair.
pub mod scan;
/// Stale catalog entry scrubbing.
pub mod scrub;
/// Store handle interface and the in-memory store.
pub mod store;
/// Identities, paths and class tags.
pub mod types;

pub use crate::error::{Fault, Result, ScanError};
pub use crate::reindex::{ReindexReport, Reindexer};
pub use crate::scan::{scan, CycleState, ScanOptions, ScanReport};
pub use crate::scrub::{CatalogScrubber, ScrubOptions, ScrubReport};
pub use crate::store::{MemoryStore, NodeRef, ObjectStore};
pub use crate::types::{ObjectClass, Oid, PhysicalPath};
