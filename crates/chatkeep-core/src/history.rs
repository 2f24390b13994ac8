use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};
use crate::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single chat message in the format sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// True if the first message is the system instruction.
pub fn is_anchored(history: &[Message]) -> bool {
    history.first().is_some_and(Message::is_system)
}

pub fn check_anchor(history: &[Message]) -> Result<()> {
    match history.first() {
        None => Err(RecordError::InvariantViolation(
            "history is empty, no system message at index 0".into(),
        )),
        Some(first) if !first.is_system() => Err(RecordError::InvariantViolation(format!(
            "index 0 has role '{}', expected 'system'",
            first.role.as_str()
        ))),
        Some(_) => Ok(()),
    }
}

/// Put the system instruction in front of `incoming`, taking it from storage.
///
/// When `persisted` has no system message at index 0, an empty one is
/// prepended. When it has one but `incoming` does not start with a system
/// message, the stored one is carried over.
pub fn anchor_history(persisted: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(incoming.len() + 1);
    match persisted.first() {
        Some(anchor) if anchor.is_system() => {
            if !is_anchored(incoming) {
                out.push(anchor.clone());
            }
        }
        _ => out.push(Message::system("")),
    }
    out.extend_from_slice(incoming);
    out
}

/// Drop the oldest messages after index 0 until at most `limit` remain.
/// Index 0 is never dropped, so a limit below 1 behaves like 1. Returns the
/// number of messages removed.
pub fn trim_history(history: &mut Vec<Message>, limit: usize) -> usize {
    let bound = limit.max(1);
    if history.len() <= bound {
        return 0;
    }
    let excess = history.len() - bound;
    history.drain(1..=excess);
    excess
}

/// [`anchor_history`] followed by [`trim_history`].
pub fn bound_history(persisted: &[Message], incoming: &[Message], limit: usize) -> Vec<Message> {
    let mut out = anchor_history(persisted, incoming);
    trim_history(&mut out, limit);
    out
}

/// Reads and writes a record's `history.json`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty history file.
    pub(crate) fn create(&self) -> Result<()> {
        std::fs::write(&self.path, b"").map_err(|e| RecordError::io(&self.path, e))
    }

    /// Overwrite with the single default system message.
    pub(crate) fn seed(&self) -> Result<()> {
        json::overwrite_document(&self.path, &[Message::system("")])
    }

    /// Full stored history. A zero-length file means "no history yet" and
    /// yields an empty vector; anything else must parse.
    pub fn load(&self) -> Result<Vec<Message>> {
        Ok(json::read_document(&self.path)?.unwrap_or_default())
    }

    /// Persist `history` under `limit`, see [`bound_history`]. Returns the
    /// number of messages trimmed away.
    pub fn save(&self, history: &[Message], limit: usize) -> Result<usize> {
        let persisted = self.load()?;
        let mut bounded = anchor_history(&persisted, history);
        let trimmed = trim_history(&mut bounded, limit);
        json::overwrite_document(&self.path, &bounded)?;
        Ok(trimmed)
    }

    /// Truncate to zero length. Bypasses the system message invariant.
    pub fn clear(&self) -> Result<()> {
        json::truncate_existing(&self.path)
    }
}
