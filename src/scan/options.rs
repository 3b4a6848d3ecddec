use serde::Serialize;

use crate::error::{Result, ScanError};

/// Prime near 1000, so the cadence does not line up with collection sizes.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 829;

/// Default cycle budget in repair mode.
pub const DEFAULT_MAX_CYCLES: u32 = 2;

/// Root child holding transient session state; never traversed.
pub const DEFAULT_SESSION_FOLDER: &str = "temp_folder";

/// Parameters of one scan run.
#[derive(Clone, Debug, Serialize)]
pub struct ScanOptions {
    /// Dispatch detected corruption to the repair registry.
    pub repair: bool,
    /// Maximum number of full passes (forced to 1 without `repair`).
    pub max_cycles: u32,
    /// Skip periodic aborts; faster, but memory grows with the graph.
    pub unlimited_memory: bool,
    /// Items between progress refreshes and transaction aborts.
    pub progress_interval: u64,
    /// Root child skipped during traversal.
    pub session_folder: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            repair: false,
            max_cycles: DEFAULT_MAX_CYCLES,
            unlimited_memory: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            session_folder: DEFAULT_SESSION_FOLDER.to_string(),
        }
    }
}

impl ScanOptions {
    /// Scan-only options.
    pub fn scan_only() -> Self {
        Self::default()
    }

    /// Repair-mode options with the given cycle budget.
    pub fn repairing(max_cycles: u32) -> Self {
        Self {
            repair: true,
            max_cycles,
            ..Self::default()
        }
    }

    /// Checks the numeric parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(ScanError::InvalidArgument(
                "max_cycles must be at least 1".into(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(ScanError::InvalidArgument(
                "progress_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Cycle budget actually applied: scanning without repair never benefits
    /// from a second pass.
    pub fn effective_max_cycles(&self) -> u32 {
        if self.repair {
            self.max_cycles
        } else {
            1
        }
    }
}
