use tracing::debug;

use crate::store::ObjectStore;

/// Bounds resident memory by discarding the ambient transaction at fixed
/// boundaries.
///
/// Repairs never rely on this: every repair action commits before the walk
/// moves on, so nothing mutating is pending when a boundary is reached.
#[derive(Clone, Copy, Debug)]
pub struct TransactionWindow {
    unlimited_memory: bool,
    releases: u64,
}

impl TransactionWindow {
    /// Window that aborts at every boundary unless `unlimited_memory` is set.
    pub fn new(unlimited_memory: bool) -> Self {
        Self {
            unlimited_memory,
            releases: 0,
        }
    }

    /// Reached a boundary: drop everything materialized since the last one.
    pub fn release(&mut self, store: &mut dyn ObjectStore) {
        if self.unlimited_memory {
            return;
        }
        store.abort();
        self.releases += 1;
        debug!(releases = self.releases, "scan.window.abort");
    }

    /// Number of aborts issued.
    pub fn releases(&self) -> u64 {
        self.releases
    }
}
