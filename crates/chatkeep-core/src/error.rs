use std::io;
use std::path::{Path, PathBuf};

use chatkeep_config::Rank;
use thiserror::Error;

/// Failures surfaced by user record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid user id '{0}'")]
    InvalidId(String),

    /// A config or history file is absent, e.g. after the record was removed.
    #[error("record file missing: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("record file corrupted: {}: {source}", .path.display())]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("history invariant violated: {0}")]
    InvariantViolation(String),

    #[error("no history limit configured for rank '{0}'")]
    PolicyLookup(Rank),

    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RecordError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Like [`RecordError::io`], but a vanished file becomes [`RecordError::Missing`].
    pub(crate) fn access(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::Missing {
                path: path.to_path_buf(),
            }
        } else {
            Self::io(path, source)
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

pub type Result<T, E = RecordError> = std::result::Result<T, E>;
