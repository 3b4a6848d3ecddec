use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::scan::counters::Counters;

/// Destination for a single overwritable status line.
pub trait ProgressSink {
    /// Replaces the current status line.
    fn update(&mut self, line: &str);

    /// Writes the final line of a pass and keeps it visible.
    fn finish(&mut self, line: &str) {
        self.update(line);
    }
}

/// Discards every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&mut self, _line: &str) {}
}

/// Keeps every line in memory.
///
/// Clones share the same buffer, so a caller can keep one handle while the
/// reporter owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    lines: Rc<RefCell<RecordedLines>>,
}

#[derive(Debug, Default)]
struct RecordedLines {
    updates: Vec<String>,
    finished: Vec<String>,
}

impl RecordingSink {
    /// Lines passed to `update`.
    pub fn updates(&self) -> Vec<String> {
        self.lines.borrow().updates.clone()
    }

    /// Lines passed to `finish`.
    pub fn finished(&self) -> Vec<String> {
        self.lines.borrow().finished.clone()
    }
}

impl ProgressSink for RecordingSink {
    fn update(&mut self, line: &str) {
        self.lines.borrow_mut().updates.push(line.to_string());
    }

    fn finish(&mut self, line: &str) {
        self.lines.borrow_mut().finished.push(line.to_string());
    }
}

/// Renders scan status at a cadence driven by the walker, never by a timer.
pub struct ProgressReporter {
    sink: Box<dyn ProgressSink>,
    show_repairs: bool,
    started: Instant,
    renders: u64,
}

impl ProgressReporter {
    /// Reporter writing to `sink`; the repairs column appears only when
    /// `show_repairs` is set.
    pub fn new(sink: Box<dyn ProgressSink>, show_repairs: bool) -> Self {
        Self {
            sink,
            show_repairs,
            started: Instant::now(),
            renders: 0,
        }
    }

    /// Reporter that prints nothing.
    pub fn silent() -> Self {
        Self::new(Box::new(NullSink), false)
    }

    /// Refreshes the status line.
    pub fn render(&mut self, cycle: u32, counters: &Counters) {
        let line = self.status_line(cycle, counters);
        self.renders += 1;
        self.sink.update(&line);
    }

    /// Writes the closing line of a pass.
    pub fn finish(&mut self, cycle: u32, counters: &Counters) {
        let line = self.status_line(cycle, counters);
        self.renders += 1;
        self.sink.finish(&line);
    }

    /// Number of lines rendered so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Formats the status line for the given counters.
    pub fn status_line(&self, cycle: u32, counters: &Counters) -> String {
        let mut line = format!(
            "[{}]  Cycle {}  | Items Scanned: {:>12} | Errors: {:>6} |",
            timestamp(),
            cycle,
            counters.items.value(),
            counters.errors.value()
        );
        if self.show_repairs {
            line.push_str(&format!(" Repairs: {:>6} |", counters.repairs.value()));
        }
        line.push_str(&format!(" {}", format_elapsed(self.started.elapsed())));
        line
    }
}

/// Wall-clock timestamp in local time (UTC when the offset is unknown).
pub fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| String::from("----------"))
}

/// Formats a duration as `H:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
