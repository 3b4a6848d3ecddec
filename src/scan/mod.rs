#![forbid(unsafe_code)]

//! Dangling-reference scanning and repair.
//!
//! [`GraphWalker`] performs one breadth-first pass over the object graph,
//! counting corruption and dispatching repairs through the
//! [`RepairRegistry`]. [`CycleController`] repeats passes until one converges
//! or the cycle budget is exhausted.

mod counters;
mod cycle;
mod options;
mod progress;
mod repair;
mod walker;
mod window;


use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::store::ObjectStore;
use crate::types::PhysicalPath;

/// Per-cycle counters.
pub use counters::{Counter, Counters};

/// Repair loop state machine and its report.
pub use cycle::{next_state, CycleController, CycleState, ScanReport};

/// Run parameters and their defaults.
pub use options::{
    ScanOptions, DEFAULT_MAX_CYCLES, DEFAULT_PROGRESS_INTERVAL, DEFAULT_SESSION_FOLDER,
};

/// Status-line rendering.
pub use progress::{format_elapsed, timestamp, NullSink, ProgressReporter, ProgressSink, RecordingSink};

/// Repair strategies and the registry that dispatches to them.
pub use repair::{
    ContainerRepair, CorruptionSignature, NamedSingletonRepair, RepairAction, RepairRegistry,
    RepairStrategy,
};

/// Single-pass traversal.
pub use walker::{GraphWalker, ScanResult};

/// Memory bounding through periodic aborts.
pub use window::TransactionWindow;

/// Cached status sub-object carried by every device.
pub const POLL_STATUS_ATTRIBUTE: &str = "_lastPollSnmpUpTime";

/// Scans the graph below `path` with the standard repair registry.
///
/// `path` accepts the forms understood by [`PhysicalPath::parse`].
///
/// # Errors
///
/// Returns [`ScanError::InvalidPath`] if `path` does not resolve, and any
/// error raised by [`CycleController::run`].
pub fn scan(
    store: &mut dyn ObjectStore,
    path: &str,
    options: ScanOptions,
    progress: ProgressReporter,
) -> Result<ScanReport> {
    options.validate()?;
    let physical = PhysicalPath::parse(path);
    let root = store
        .resolve_path(&physical)
        .map_err(|source| ScanError::InvalidPath {
            path: path.to_string(),
            source,
        })?;
    info!(
        path = %root.path(),
        repair = options.repair,
        max_cycles = options.effective_max_cycles(),
        unlimited_memory = options.unlimited_memory,
        "scan.begin"
    );
    let registry = RepairRegistry::standard();
    if options.repair {
        debug!(strategies = ?registry.names(), "scan.repair.registry");
    }
    let walker = GraphWalker::new(options, registry, progress);
    let mut controller = CycleController::new(walker);
    let report = controller.run(store, &root)?;
    info!(
        state = ?report.state,
        cycles = report.cycles.len(),
        remaining_errors = report.remaining_errors(),
        total_repairs = report.total_repairs(),
        elapsed_secs = report.elapsed.as_secs_f64(),
        "scan.completed"
    );
    Ok(report)
}
