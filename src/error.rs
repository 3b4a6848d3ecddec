use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::{CorruptionKind, Oid, PhysicalPath};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Outcome of a single failed dereference against the store.
///
/// The first three variants are the recognized corruption classes the walker
/// counts and hands to the repair registry.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Fault {
    /// No record can be materialized for the identity.
    #[error("missing record {0}")]
    MissingRecord(Oid),
    /// A cached or optional child is absent.
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),
    /// A mapping lookup failed.
    #[error("missing key '{0}'")]
    MissingKey(String),
    /// Internal platform fault; continuing is not known to be safe.
    #[error("severe platform fault: {0}")]
    Severe(String),
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl Fault {
    /// Corruption class of this fault, if it is one of the recognized three.
    pub fn kind(&self) -> Option<CorruptionKind> {
        match self {
            Fault::MissingRecord(_) => Some(CorruptionKind::MissingRecord),
            Fault::MissingAttribute(_) => Some(CorruptionKind::MissingAttribute),
            Fault::MissingKey(_) => Some(CorruptionKind::MissingKey),
            Fault::Severe(_) | Fault::Other(_) => None,
        }
    }

    /// Identity embedded in the fault, when the storage layer reported one.
    pub fn oid(&self) -> Option<Oid> {
        match self {
            Fault::MissingRecord(oid) => Some(*oid),
            _ => None,
        }
    }

    /// Short type label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Fault::MissingRecord(_) => "MissingRecord",
            Fault::MissingAttribute(_) => "MissingAttribute",
            Fault::MissingKey(_) => "MissingKey",
            Fault::Severe(_) => "SevereFault",
            Fault::Other(_) => "Fault",
        }
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Fault::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::Other(err.to_string())
    }
}

/// Error type for scanning, scrubbing and their ambient plumbing.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The supplied path does not resolve to a node.
    #[error("invalid path: {path} ({source})")]
    InvalidPath {
        /// Path as typed by the caller.
        path: String,
        /// Why resolution failed.
        source: Fault,
    },
    /// Store file not found at the specified path.
    #[error("store not found: {}", .0.display())]
    MissingStore(PathBuf),
    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A severe fault while invoking a relationship ended the pass.
    #[error("{message} on relationship '{name}' of {path}")]
    Severe {
        /// Path of the node owning the relationship.
        path: PhysicalPath,
        /// Relationship name.
        name: String,
        /// Fault text reported by the store.
        message: String,
    },
    /// Store-level failure that the walker does not classify.
    #[error(transparent)]
    Fault(#[from] Fault),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Snapshot or event encoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Another maintenance process holds the tool lock.
    #[error("lock already held: {}", .0.display())]
    LockHeld(PathBuf),
    /// Configuration file error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
