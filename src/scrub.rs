#![forbid(unsafe_code)]

//! Stale-entry scrubbing for flat secondary catalogs.
//!
//! The same convergence loop as the graph scan, applied to a flat list: each
//! pass checks every catalog entry against the object it points to and, in
//! repair mode, unindexes the entries whose target is gone or replaced.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};
use crate::scan::{timestamp, Counter, CycleState, NullSink, ProgressSink};
use crate::store::{CatalogEntry, ObjectStore};

/// Default cycle budget for catalog scrubbing.
pub const DEFAULT_SCRUB_CYCLES: u32 = 12;

const BAR_WIDTH: u64 = 50;

/// Parameters of a scrub run.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ScrubOptions {
    /// Remove stale entries.
    pub repair: bool,
    /// Maximum passes (forced to 1 without `repair`).
    pub max_cycles: u32,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self {
            repair: false,
            max_cycles: DEFAULT_SCRUB_CYCLES,
        }
    }
}

/// Outcome of one pass over a catalog.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CatalogPass {
    /// 1-based cycle number.
    pub cycle: u32,
    /// Entries examined.
    pub scanned: u64,
    /// Stale entries found.
    pub stale: u64,
    /// Stale entries removed.
    pub removed: u64,
}

/// Outcome of scrubbing one catalog.
#[derive(Clone, Debug, Serialize)]
pub struct ScrubReport {
    /// Catalog name.
    pub catalog: String,
    /// Entry count before the first pass.
    pub initial_size: usize,
    /// Terminal state of the loop.
    pub state: CycleState,
    /// Per-pass results.
    pub passes: Vec<CatalogPass>,
    /// Wall-clock duration.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ScrubReport {
    /// Stale entries seen by the final pass.
    pub fn remaining_stale(&self) -> u64 {
        self.passes.last().map(|pass| pass.stale).unwrap_or(0)
    }

    /// Entries removed across all passes.
    pub fn total_removed(&self) -> u64 {
        self.passes.iter().map(|pass| pass.removed).sum()
    }

    /// Removed entries as a percentage of the initial size.
    pub fn removed_percentage(&self) -> f64 {
        if self.initial_size == 0 {
            return 0.0;
        }
        self.total_removed() as f64 * 100.0 / self.initial_size as f64
    }
}

/// Non-empty catalogs and their sizes.
pub fn present_catalogs(store: &mut dyn ObjectStore) -> Vec<(String, usize)> {
    let mut present = Vec::new();
    for name in store.catalog_names() {
        match store.catalog_entries(&name) {
            Ok(entries) if !entries.is_empty() => present.push((name, entries.len())),
            Ok(_) => debug!(catalog = %name, "scrub.catalog.empty"),
            Err(err) => debug!(catalog = %name, %err, "scrub.catalog.unreadable"),
        }
    }
    present
}

/// Runs the scrub loop over one catalog.
pub struct CatalogScrubber {
    options: ScrubOptions,
    sink: Box<dyn ProgressSink>,
}

impl CatalogScrubber {
    /// Scrubber reporting to `sink`.
    pub fn new(options: ScrubOptions, sink: Box<dyn ProgressSink>) -> Self {
        Self { options, sink }
    }

    /// Scrubber that prints nothing.
    pub fn silent(options: ScrubOptions) -> Self {
        Self::new(options, Box::new(NullSink))
    }

    /// Scrubs `catalog` until a pass finds no stale entries or the budget is
    /// spent. Each pass ends with a commit.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidArgument`] for a zero budget or an
    /// unknown catalog, and store errors from the closing commit.
    pub fn scrub(&mut self, store: &mut dyn ObjectStore, catalog: &str) -> Result<ScrubReport> {
        if self.options.max_cycles == 0 {
            return Err(ScanError::InvalidArgument(
                "max_cycles must be at least 1".into(),
            ));
        }
        let started = Instant::now();
        let max_cycles = if self.options.repair {
            self.options.max_cycles
        } else {
            1
        };
        let initial_size = store
            .catalog_entries(catalog)
            .map_err(|_| ScanError::InvalidArgument(format!("unknown catalog '{catalog}'")))?
            .len();
        info!(catalog, initial_size, "scrub.begin");

        let mut passes = Vec::new();
        let mut state = CycleState::Running;
        while state == CycleState::Running {
            let cycle = passes.len() as u32 + 1;
            if self.options.repair {
                info!(catalog, cycle, "scrub.cycle.begin");
            }
            let pass = self.run_pass(store, catalog, cycle)?;
            store.commit()?;
            passes.push(pass);
            state = if pass.stale == 0 {
                CycleState::Converged
            } else if cycle >= max_cycles {
                CycleState::ExhaustedBudget
            } else {
                CycleState::Running
            };
        }

        let report = ScrubReport {
            catalog: catalog.to_string(),
            initial_size,
            state,
            passes,
            elapsed: started.elapsed(),
        };
        self.sink.finish(&self.summary_line(&report));
        if report.remaining_stale() > 0 {
            warn!(
                catalog,
                stale = report.remaining_stale(),
                "scrub.completed_with_stale_entries"
            );
        } else {
            info!(catalog, removed = report.total_removed(), "scrub.completed");
        }
        Ok(report)
    }

    fn run_pass(
        &mut self,
        store: &mut dyn ObjectStore,
        catalog: &str,
        cycle: u32,
    ) -> Result<CatalogPass> {
        self.sink.update(&self.bar_line(0, 0));
        let entries = store.catalog_entries(catalog)?;
        let total = entries.len() as u64;
        let chunk_size = if total > BAR_WIDTH {
            total / BAR_WIDTH + 1
        } else {
            1
        };

        let mut scanned = Counter::default();
        let mut stale = Counter::default();
        let mut removed = Counter::default();
        for entry in &entries {
            let seen = scanned.increment();
            if seen % chunk_size == 0 {
                let chunk = seen / chunk_size;
                debug!(catalog, percent = 2 * chunk.min(BAR_WIDTH), "scrub.progress");
                self.sink.update(&self.bar_line(chunk, stale.value()));
            }
            if !is_stale(store, entry) {
                continue;
            }
            stale.increment();
            warn!(catalog, key = %entry.key, path = %entry.path, "scrub.stale_entry");
            if !self.options.repair {
                continue;
            }
            match store.uncatalog(catalog, &entry.key) {
                Ok(()) => {
                    removed.increment();
                    info!(catalog, key = %entry.key, "scrub.entry_removed");
                }
                Err(err) => error!(catalog, key = %entry.key, %err, "scrub.remove_failed"),
            }
        }

        Ok(CatalogPass {
            cycle,
            scanned: scanned.value(),
            stale: stale.value(),
            removed: removed.value(),
        })
    }

    fn bar_line(&self, chunk: u64, stale: u64) -> String {
        let chunk = chunk.min(BAR_WIDTH);
        let verb = if self.options.repair {
            "Cleaning"
        } else {
            "Scanning"
        };
        let mut line = format!(
            "[{}]  {:<9} [{:<width$}] {:>3}%",
            timestamp(),
            verb,
            "=".repeat(chunk as usize),
            2 * chunk,
            width = BAR_WIDTH as usize
        );
        if stale > 0 {
            line.push_str(&format!(" [{stale} stale entries]"));
        }
        line
    }

    fn summary_line(&self, report: &ScrubReport) -> String {
        let full = "=".repeat(BAR_WIDTH as usize);
        let status = if report.remaining_stale() == 0 && report.total_removed() == 0 {
            "[No issues]".to_string()
        } else if self.options.repair {
            format!(
                "[{} stale entries removed ({:.1}%)]",
                report.total_removed(),
                report.removed_percentage()
            )
        } else {
            format!(
                "[There are {} stale entries ({:.1}%)]",
                report.remaining_stale(),
                report.remaining_stale() as f64 * 100.0 / report.initial_size.max(1) as f64
            )
        };
        let verb = if report.remaining_stale() > 0 {
            "WARNING"
        } else {
            "Verified"
        };
        format!("[{}]  {:<9} [{full}] 100% {status}", timestamp(), verb)
    }
}

fn is_stale(store: &mut dyn ObjectStore, entry: &CatalogEntry) -> bool {
    match store.resolve_path(&entry.path) {
        Ok(node) => node.oid() != entry.oid,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{seed_demo, DEVICE_CATALOG};
    use crate::scan::RecordingSink;
    use crate::store::MemoryStore;

    #[test]
    fn clean_catalog_converges_in_one_pass() {
        let mut store = MemoryStore::new();
        seed_demo(&mut store, false).unwrap();
        let mut scrubber = CatalogScrubber::silent(ScrubOptions {
            repair: true,
            max_cycles: 4,
        });
        let report = scrubber.scrub(&mut store, DEVICE_CATALOG).unwrap();
        assert_eq!(report.state, CycleState::Converged);
        assert_eq!(report.passes.len(), 1);
        assert_eq!(report.initial_size, 2);
    }

    #[test]
    fn stale_entry_is_reported_without_repair() {
        let mut store = MemoryStore::new();
        seed_demo(&mut store, true).unwrap();
        let mut scrubber = CatalogScrubber::silent(ScrubOptions::default());
        let report = scrubber.scrub(&mut store, DEVICE_CATALOG).unwrap();
        assert_eq!(report.passes.len(), 1);
        assert_eq!(report.remaining_stale(), 1);
        assert_eq!(report.total_removed(), 0);
        assert_eq!(report.state, CycleState::ExhaustedBudget);
        assert_eq!(store.catalog_entries(DEVICE_CATALOG).unwrap().len(), 3);
    }

    #[test]
    fn exhausted_repair_budget_ends_with_a_warning() {
        let mut store = MemoryStore::new();
        seed_demo(&mut store, true).unwrap();
        let sink = RecordingSink::default();
        // A single pass removes the entry but never gets to confirm it.
        let mut scrubber = CatalogScrubber::new(
            ScrubOptions {
                repair: true,
                max_cycles: 1,
            },
            Box::new(sink.clone()),
        );
        let report = scrubber.scrub(&mut store, DEVICE_CATALOG).unwrap();
        assert_eq!(report.state, CycleState::ExhaustedBudget);
        assert_eq!(report.remaining_stale(), 1);
        let finished = sink.finished();
        assert!(finished[0].contains("WARNING"));
        assert!(!finished[0].contains("Verified"));
    }

    #[test]
    fn unknown_catalog_is_rejected() {
        let mut store = MemoryStore::new();
        let mut scrubber = CatalogScrubber::silent(ScrubOptions::default());
        let err = scrubber.scrub(&mut store, "Networks.ipSearch").unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
    }
}
