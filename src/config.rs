//! File-backed tool configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::{
    ScanOptions, DEFAULT_MAX_CYCLES, DEFAULT_PROGRESS_INTERVAL, DEFAULT_SESSION_FOLDER,
};
use crate::scrub::{ScrubOptions, DEFAULT_SCRUB_CYCLES};

/// Settings read from `config.toml`; every field has a default.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ToolConfig {
    /// `[scan]` section.
    #[serde(default)]
    pub scan: ScanSection,
    /// `[scrub]` section.
    #[serde(default)]
    pub scrub: ScrubSection,
    /// `[lock]` section.
    #[serde(default)]
    pub lock: LockSection,
    /// `[logging]` section.
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Defaults for `refscan scan`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    /// Cycle budget in repair mode.
    pub cycles: u32,
    /// Items between progress refreshes and aborts.
    pub progress_interval: u64,
    /// Root child never traversed.
    pub session_folder: String,
    /// Skip periodic aborts.
    pub unlimited_memory: bool,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            cycles: DEFAULT_MAX_CYCLES,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            session_folder: DEFAULT_SESSION_FOLDER.to_string(),
            unlimited_memory: false,
        }
    }
}

/// Defaults for `refscan scrub`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrubSection {
    /// Cycle budget in repair mode.
    pub cycles: u32,
}

impl Default for ScrubSection {
    fn default() -> Self {
        Self {
            cycles: DEFAULT_SCRUB_CYCLES,
        }
    }
}

/// Process lock location.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LockSection {
    /// Lock file; `<tmp>/refscan.lock` when unset.
    pub path: Option<PathBuf>,
}

/// Log file settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory of the log file; the system temp dir when unset.
    pub dir: Option<PathBuf>,
    /// `EnvFilter` directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
        }
    }
}

impl ToolConfig {
    /// Loads `explicit`, or the default location when `None`. A missing
    /// file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut config = read_file(&path)?;
        config.validate(&path)?;
        config.source = Some(path);
        Ok(config)
    }

    /// File the settings came from, if one existed.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Scan parameters from the `[scan]` section.
    pub fn scan_options(&self, repair: bool) -> ScanOptions {
        ScanOptions {
            repair,
            max_cycles: self.scan.cycles,
            unlimited_memory: self.scan.unlimited_memory,
            progress_interval: self.scan.progress_interval,
            session_folder: self.scan.session_folder.clone(),
        }
    }

    /// Scrub parameters from the `[scrub]` section.
    pub fn scrub_options(&self, repair: bool) -> ScrubOptions {
        ScrubOptions {
            repair,
            max_cycles: self.scrub.cycles,
        }
    }

    /// Effective lock file path.
    pub fn lock_path(&self) -> PathBuf {
        self.lock
            .path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("refscan.lock"))
    }

    /// Effective log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.logging.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.scan.cycles == 0 {
            return Err(invalid("scan.cycles", "must be at least 1"));
        }
        if self.scan.progress_interval == 0 {
            return Err(invalid("scan.progress_interval", "must be at least 1"));
        }
        if self.scrub.cycles == 0 {
            return Err(invalid("scrub.cycles", "must be at least 1"));
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<ToolConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Failures while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ToolConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("config {path}: '{key}' {reason}")]
    Invalid {
        /// Config file.
        path: PathBuf,
        /// Dotted key of the offending value.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// `<config dir>/refscan/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("refscan").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolConfig::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert!(config.source().is_none());
        let options = config.scan_options(true);
        assert_eq!(options.max_cycles, 2);
        assert_eq!(options.progress_interval, 829);
        assert_eq!(options.session_folder, "temp_folder");
        assert_eq!(config.scrub_options(true).max_cycles, 12);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[scan]\ncycles = 5\n\n[lock]\npath = \"/var/run/refscan.lock\"\n",
        )
        .unwrap();
        let config = ToolConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.source(), Some(path.as_path()));
        assert_eq!(config.scan.cycles, 5);
        assert_eq!(config.scan.progress_interval, 829);
        assert_eq!(config.lock_path(), PathBuf::from("/var/run/refscan.lock"));
    }

    #[test]
    fn zero_cycles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scrub]\ncycles = 0\n").unwrap();
        let err = ToolConfig::load(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "scrub.cycles"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scan\ncycles = ").unwrap();
        assert!(matches!(
            ToolConfig::load(Some(path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
