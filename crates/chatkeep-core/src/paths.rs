use std::path::{Path, PathBuf};

use crate::error::{RecordError, Result};

pub const CONFIG_FILE: &str = "user.cfg";
pub const HISTORY_FILE: &str = "history.json";
pub const LOG_FILE: &str = "user.log";

/// Whether a record directory was already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    New,
    Existing,
}

/// File layout of one user record: `<root>/<id>/{user.cfg,history.json,user.log}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    id: String,
    dir: PathBuf,
    config: PathBuf,
    history: PathBuf,
    log: PathBuf,
}

impl RecordPaths {
    pub fn new(root: &Path, id: &str) -> Result<Self> {
        validate_id(id)?;
        let dir = root.join(id);
        Ok(Self {
            id: id.to_string(),
            config: dir.join(CONFIG_FILE),
            history: dir.join(HISTORY_FILE),
            log: dir.join(LOG_FILE),
            dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Path {
        &self.config
    }

    pub fn history(&self) -> &Path {
        &self.history
    }

    pub fn log(&self) -> &Path {
        &self.log
    }

    /// A record exists iff its directory does; file contents are not inspected.
    pub fn status(&self) -> RecordStatus {
        if self.dir.is_dir() {
            RecordStatus::Existing
        } else {
            RecordStatus::New
        }
    }
}

/// Ids are used verbatim as directory names, so anything that could escape
/// the root is refused.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(RecordError::InvalidId(id.to_string()));
    }
    Ok(())
}
