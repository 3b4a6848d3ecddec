use serde::Serialize;

/// Monotonic counter, reset once per scan cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Counter(u64);

impl Counter {
    /// Adds one and returns the new value.
    pub fn increment(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Back to zero.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// The three per-cycle counters read by progress reporting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Counters {
    /// Items scanned.
    pub items: Counter,
    /// Corruptions detected.
    pub errors: Counter,
    /// Repairs attempted.
    pub repairs: Counter,
}

impl Counters {
    /// Resets all three counters.
    pub fn reset(&mut self) {
        self.items.reset();
        self.errors.reset();
        self.repairs.reset();
    }
}
