//! End-of-run status events.
//!
//! Every run reports one [`RunSummary`] to an [`EventSink`] so that an
//! operator console can tell whether the last scheduled scan found anything.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::Result;

/// Component every summary is filed under.
pub const EXECUTION_COMPONENT: &str = "executionStatus";

/// Event severity on the console's numeric scale.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// Run completed cleanly.
    Info,
    /// Run found errors.
    Error,
}

impl Severity {
    /// Numeric level.
    pub fn level(self) -> u8 {
        match self {
            Severity::Info => 2,
            Severity::Error => 4,
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

/// Summary of one tool run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Tool that ran (`refscan-scan`, `refscan-scrub`).
    pub tool: String,
    /// Component the event is filed under.
    pub component: String,
    /// Severity derived from the error count.
    pub severity: Severity,
    /// One-line human summary.
    pub summary: String,
    /// Errors found.
    pub errors: u64,
    /// Run duration in seconds.
    pub elapsed_secs: f64,
    /// Emission time, RFC 3339.
    pub timestamp: String,
}

impl RunSummary {
    /// Summary for a run of `tool` that found `errors` problems.
    pub fn new(tool: &str, errors: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let (severity, summary) = if errors > 0 {
            (
                Severity::Error,
                format!("{tool} encountered {errors} errors (took {secs:.2} seconds)"),
            )
        } else {
            (
                Severity::Info,
                format!("{tool} completed without errors (took {secs:.2} seconds)"),
            )
        };
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            tool: tool.to_string(),
            component: EXECUTION_COMPONENT.to_string(),
            severity,
            summary,
            errors,
            elapsed_secs: secs,
            timestamp,
        }
    }
}

/// Destination of run summaries.
pub trait EventSink {
    /// Publishes one summary.
    fn emit(&mut self, event: &RunSummary) -> Result<()>;
}

/// Writes summaries to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&mut self, event: &RunSummary) -> Result<()> {
        match event.severity {
            Severity::Info => info!(
                tool = %event.tool,
                component = %event.component,
                severity = event.severity.level(),
                summary = %event.summary,
                "event.summary"
            ),
            Severity::Error => warn!(
                tool = %event.tool,
                component = %event.component,
                severity = event.severity.level(),
                summary = %event.summary,
                "event.summary"
            ),
        }
        Ok(())
    }
}

/// Appends one JSON object per summary to a file.
#[derive(Clone, Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    /// Sink appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&mut self, event: &RunSummary) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_error_count() {
        let clean = RunSummary::new("refscan-scan", 0, Duration::from_millis(1500));
        assert_eq!(clean.severity, Severity::Info);
        assert_eq!(
            clean.summary,
            "refscan-scan completed without errors (took 1.50 seconds)"
        );
        let dirty = RunSummary::new("refscan-scan", 3, Duration::from_secs(2));
        assert_eq!(dirty.severity.level(), 4);
        assert!(dirty.summary.contains("encountered 3 errors"));
        assert_eq!(dirty.component, EXECUTION_COMPONENT);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlEventSink::new(dir.path().join("events").join("runs.jsonl"));
        sink.emit(&RunSummary::new("refscan-scan", 0, Duration::ZERO))
            .unwrap();
        sink.emit(&RunSummary::new("refscan-scrub", 2, Duration::ZERO))
            .unwrap();
        let contents = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["severity"], 2);
        assert_eq!(lines[1]["severity"], 4);
        assert_eq!(lines[1]["component"], "executionStatus");
    }
}
