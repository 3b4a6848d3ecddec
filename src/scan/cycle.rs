use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::scan::repair::CorruptionSignature;
use crate::scan::walker::{GraphWalker, ScanResult};
use crate::store::{NodeRef, ObjectStore};

/// State of the repair loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Another pass is due.
    Running,
    /// The last pass found nothing, or repaired nothing.
    Converged,
    /// The cycle budget ran out with work possibly remaining.
    ExhaustedBudget,
}

/// Outcome of a full run.
#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    /// Terminal state.
    pub state: CycleState,
    /// Whether repairs were enabled.
    pub repair: bool,
    /// Cycle budget that was applied.
    pub max_cycles: u32,
    /// Per-pass results, in order.
    pub cycles: Vec<ScanResult>,
    /// Corruptions seen during the last pass (capped).
    pub findings: Vec<CorruptionSignature>,
    /// Wall-clock duration of the run.
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl ScanReport {
    /// Result of the final pass.
    pub fn last(&self) -> ScanResult {
        self.cycles.last().copied().unwrap_or_default()
    }

    /// Errors detected by the final pass; what is known to remain.
    pub fn remaining_errors(&self) -> u64 {
        self.last().errors
    }

    /// Repairs attempted across all passes.
    pub fn total_repairs(&self) -> u64 {
        self.cycles.iter().map(|cycle| cycle.repairs).sum()
    }

    /// Whether the final pass found no corruption.
    pub fn is_clean(&self) -> bool {
        self.remaining_errors() == 0
    }
}

fn serialize_secs<S: serde::Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Re-runs the walker until a pass converges or the budget is spent.
pub struct CycleController {
    walker: GraphWalker,
    state: CycleState,
}

impl CycleController {
    /// Controller driving `walker`.
    pub fn new(walker: GraphWalker) -> Self {
        Self {
            walker,
            state: CycleState::Running,
        }
    }

    /// Current state.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// The wrapped walker.
    pub fn walker(&self) -> &GraphWalker {
        &self.walker
    }

    /// Runs passes from `root` until the loop leaves `Running`.
    ///
    /// # Errors
    ///
    /// Propagates a severe fault from the walker; passes already completed
    /// are lost with it, and the counters hold the values of the failed pass.
    pub fn run(&mut self, store: &mut dyn ObjectStore, root: &NodeRef) -> Result<ScanReport> {
        self.walker.options().validate()?;
        let started = Instant::now();
        let repair = self.walker.options().repair;
        let max_cycles = self.walker.options().effective_max_cycles();
        let mut cycles = Vec::new();
        self.state = CycleState::Running;

        while self.state == CycleState::Running {
            let cycle = cycles.len() as u32 + 1;
            info!(cycle, max_cycles, path = %root.path(), "scan.cycle.begin");
            let result = self.walker.walk(store, root, cycle)?;
            info!(
                cycle,
                items = result.items,
                errors = result.errors,
                repairs = result.repairs,
                "scan.cycle.complete"
            );
            cycles.push(result);
            self.state = next_state(repair, &result, max_cycles);
        }

        Ok(ScanReport {
            state: self.state,
            repair,
            max_cycles,
            cycles,
            findings: self.walker.findings().to_vec(),
            elapsed: started.elapsed(),
        })
    }
}

/// Transition applied after each pass.
///
/// A pass with no errors converges in either mode, so a clean scan-only run
/// reports `Converged` rather than `ExhaustedBudget`; the latter is kept for
/// runs that stop with corruption still in place.
pub fn next_state(repair: bool, result: &ScanResult, max_cycles: u32) -> CycleState {
    if result.errors == 0 || (repair && result.repairs == 0) {
        CycleState::Converged
    } else if result.cycle >= max_cycles {
        CycleState::ExhaustedBudget
    } else {
        CycleState::Running
    }
}
