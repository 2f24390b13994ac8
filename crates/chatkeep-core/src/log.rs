//! Per-user diagnostics logs.
//!
//! Every [`UserLog`] has two sinks. Events always go to the process-wide
//! `tracing` subscriber, tagged with the user id, at every level. Events at
//! or above the file level are also appended to the record's `user.log`.
//! The [`LogManager`] owns one stream per user id.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatkeep_config::UsersConfig;
use chrono::Local;
use tracing::Level;

use crate::error::{RecordError, Result};

/// Prefix of the logger name written into every file line.
pub const LOGGER_PREFIX: &str = "USERLOG_";

/// Leveled log stream for one user record.
#[derive(Debug)]
pub struct UserLog {
    id: String,
    path: PathBuf,
    file_level: Level,
    file: Mutex<Option<File>>,
}

impl UserLog {
    /// Open the file sink in append mode, creating the file if needed.
    pub fn open(id: &str, path: &Path, file_level: Level) -> Result<Self> {
        let file = open_append(path)?;
        Ok(Self {
            id: id.to_string(),
            path: path.to_path_buf(),
            file_level,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_level(&self) -> Level {
        self.file_level
    }

    pub fn debug(&self, text: &str) {
        self.emit(Level::DEBUG, text);
    }

    pub fn info(&self, text: &str) {
        self.emit(Level::INFO, text);
    }

    pub fn warn(&self, text: &str) {
        self.emit(Level::WARN, text);
    }

    pub fn error(&self, text: &str) {
        self.emit(Level::ERROR, text);
    }

    fn emit(&self, level: Level, text: &str) {
        match level {
            Level::ERROR => tracing::error!(user = %self.id, "{text}"),
            Level::WARN => tracing::warn!(user = %self.id, "{text}"),
            Level::INFO => tracing::info!(user = %self.id, "{text}"),
            Level::DEBUG => tracing::debug!(user = %self.id, "{text}"),
            _ => tracing::trace!(user = %self.id, "{text}"),
        }

        // Lower levels compare as more severe: ERROR < WARN < INFO < DEBUG.
        if level > self.file_level {
            return;
        }
        let mut guard = self.lock_file();
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = format_line(&self.id, level, text);
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(user = %self.id, "failed to write {}: {e}", self.path.display());
        }
    }

    /// Truncate `user.log`. The open append handle keeps working and
    /// continues at the new end of file.
    pub fn clear(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map(drop)
            .map_err(|e| RecordError::access(&self.path, e))
    }

    /// Detach and close the file sink. The `tracing` sink is untouched.
    pub fn close(&self) {
        if let Some(mut file) = self.lock_file().take() {
            let _ = file.flush();
        }
    }

    /// Point the file sink at `user.log` again, e.g. after the file was recreated.
    pub fn reopen(&self) -> Result<()> {
        let file = open_append(&self.path)?;
        *self.lock_file() = Some(file);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.lock_file().is_some()
    }

    fn lock_file(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RecordError::io(path, e))
}

/// `2026-01-02 03:04:05,678 - USERLOG_<id> - INFO - text`
fn format_line(id: &str, level: Level, text: &str) -> String {
    format!(
        "{} - {LOGGER_PREFIX}{id} - {} - {text}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        level_name(level)
    )
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        _ => "TRACE",
    }
}

/// Registry of per-user log streams, one per id.
#[derive(Debug)]
pub struct LogManager {
    file_level: Level,
    streams: Mutex<HashMap<String, Arc<UserLog>>>,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LogManager {
    pub fn new(file_level: Level) -> Self {
        Self {
            file_level,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Build from settings. An unparsable level falls back to INFO.
    pub fn from_config(users: &UsersConfig) -> Self {
        let level = users.file_log_level.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Unknown fileLogLevel '{}', using 'info'",
                users.file_log_level
            );
            Level::INFO
        });
        Self::new(level)
    }

    pub fn file_level(&self) -> Level {
        self.file_level
    }

    /// Return the stream for `id`, creating it on first use. A stream whose
    /// file sink was closed gets it reopened.
    pub fn attach(&self, id: &str, path: &Path) -> Result<Arc<UserLog>> {
        let mut streams = self.lock_streams();
        if let Some(existing) = streams.get(id) {
            if existing.path() == path {
                if !existing.is_attached() {
                    existing.reopen()?;
                }
                return Ok(Arc::clone(existing));
            }
        }
        let log = Arc::new(UserLog::open(id, path, self.file_level)?);
        if let Some(stale) = streams.insert(id.to_string(), Arc::clone(&log)) {
            stale.close();
        }
        Ok(log)
    }

    /// Close the file sink for `id` and forget the stream.
    pub fn detach(&self, id: &str) -> Option<Arc<UserLog>> {
        let log = self.lock_streams().remove(id)?;
        log.close();
        Some(log)
    }

    pub fn get(&self, id: &str) -> Option<Arc<UserLog>> {
        self.lock_streams().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<String, Arc<UserLog>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
