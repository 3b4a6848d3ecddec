//! Single-instance guard for mutating runs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};

/// Exclusive advisory lock held for the duration of a run.
///
/// The lock lives on the open file, so the kernel drops it when the holder
/// exits, however it exits. The file itself stays on disk and only records
/// the pid of the last holder.
#[derive(Debug)]
pub struct ToolLock {
    file: File,
    path: PathBuf,
}

impl ToolLock {
    /// Takes the lock at `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::LockHeld`] when another open handle holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if let Err(err) = file.try_lock_exclusive() {
            if is_contended(&err) {
                return Err(ScanError::LockHeld(path));
            }
            return Err(err.into());
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "lock.acquired");
        Ok(Self { file, path })
    }

    /// Lock file location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for ToolLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(path = %self.path.display(), "lock.released"),
            Err(err) => warn!(path = %self.path.display(), %err, "lock.release_failed"),
        }
    }
}
