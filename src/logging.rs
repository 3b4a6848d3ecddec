use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, ScanError};

/// Location of the detailed log for `tool` inside `dir`.
pub fn log_path(dir: &Path, tool: &str) -> PathBuf {
    dir.join(format!("{tool}.log"))
}

/// Installs the global subscriber, appending to `<dir>/<tool>.log`.
///
/// `level` is an `EnvFilter` directive such as `info` or
/// `refscan=debug`. Returns the log file path.
pub fn init_logging(level: &str, dir: &Path, tool: &str) -> Result<PathBuf> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| ScanError::InvalidArgument(format!("Invalid log level: {e}")))?;
    fs::create_dir_all(dir)?;
    let path = log_path(dir, tool);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|_| ScanError::InvalidArgument("Logging already initialized".into()))?;
    Ok(path)
}
