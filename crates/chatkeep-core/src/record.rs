use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatkeep_config::{resolve_root, Config, Rank};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, UserConfig};
use crate::error::{RecordError, Result};
use crate::history::{check_anchor, HistoryStore, Message};
use crate::log::{LogManager, UserLog};
use crate::paths::{RecordPaths, RecordStatus};
use crate::rank::{history_limit, RankPolicy};

/// Opens user records under a shared root folder.
#[derive(Clone)]
pub struct RecordStore {
    root: PathBuf,
    logs: Arc<LogManager>,
    policy: Arc<dyn RankPolicy>,
}

impl RecordStore {
    pub fn new(root: &Path, logs: Arc<LogManager>, policy: Arc<dyn RankPolicy>) -> Self {
        Self {
            root: root.to_path_buf(),
            logs,
            policy,
        }
    }

    /// Root, file log level and rank table from bot-wide settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &resolve_root(&config.users.root),
            Arc::new(LogManager::from_config(&config.users)),
            Arc::new(config.ranks.clone()),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs(&self) -> &Arc<LogManager> {
        &self.logs
    }

    /// Whether a record for `id` is on disk. Creates nothing.
    pub fn status(&self, id: &str) -> Result<RecordStatus> {
        Ok(RecordPaths::new(&self.root, id)?.status())
    }

    /// Open the record for `id`, creating it first if its directory is absent.
    pub fn open(&self, id: &str) -> Result<UserRecord> {
        let paths = RecordPaths::new(&self.root, id)?;
        std::fs::create_dir_all(&self.root).map_err(|e| RecordError::io(&self.root, e))?;

        let status = paths.status();
        if status == RecordStatus::New {
            std::fs::create_dir_all(paths.dir()).map_err(|e| RecordError::io(paths.dir(), e))?;
            create_record_files(&paths)?;
        }

        let log = self.logs.attach(id, paths.log())?;
        if status == RecordStatus::New {
            info!(user = id, "Created user record at {}", paths.dir().display());
            log.info(&format!("New user {id} registered"));
        }

        Ok(UserRecord {
            config: ConfigStore::new(paths.config()),
            history: HistoryStore::new(paths.history()),
            paths,
            status,
            log,
            logs: Arc::clone(&self.logs),
            policy: Arc::clone(&self.policy),
        })
    }

    /// Ids of all records under the root, sorted. A missing root means none.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecordError::io(&self.root, e)),
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Default config, empty log, empty history, then the seeded system message.
fn create_record_files(paths: &RecordPaths) -> Result<()> {
    ConfigStore::new(paths.config()).create(&UserConfig::default_for(paths.id()))?;
    std::fs::write(paths.log(), b"").map_err(|e| RecordError::io(paths.log(), e))?;
    let history = HistoryStore::new(paths.history());
    history.create()?;
    history.seed()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecordError::io(path, e)),
    }
}

/// One user's persisted state: `user.cfg`, `history.json` and `user.log`.
///
/// Callers must not hold two records for the same id at once; nothing here
/// locks the files.
pub struct UserRecord {
    paths: RecordPaths,
    status: RecordStatus,
    config: ConfigStore,
    history: HistoryStore,
    log: Arc<UserLog>,
    logs: Arc<LogManager>,
    policy: Arc<dyn RankPolicy>,
}

impl UserRecord {
    pub fn id(&self) -> &str {
        self.paths.id()
    }

    pub fn paths(&self) -> &RecordPaths {
        &self.paths
    }

    /// Whether `open` found the record on disk or had to create it.
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn is_new(&self) -> bool {
        self.status == RecordStatus::New
    }

    pub fn log(&self) -> &UserLog {
        &self.log
    }

    pub fn debug(&self, text: &str) {
        self.log.debug(text);
    }

    pub fn info(&self, text: &str) {
        self.log.info(text);
    }

    pub fn error(&self, text: &str) {
        self.log.error(text);
    }

    // ---- config ----

    pub fn config(&self) -> Result<UserConfig> {
        self.config.get()
    }

    pub fn write_config(&self, config: &UserConfig) -> Result<()> {
        self.config.write(config)
    }

    /// History limit for the record's current rank.
    pub fn history_limit(&self) -> Result<usize> {
        let rank = self.config.get()?.rank;
        history_limit(self.policy.as_ref(), rank)
    }

    /// Count one model request against the lifetime and daily counters.
    /// An invalid cost fails with [`RecordError::InvalidUsage`] before anything is written.
    pub fn record_usage(&self, tokens: u64, cost: f64) -> Result<UserConfig> {
        let mut config = self.config.get()?;
        config.record_request(tokens, cost, Utc::now())?;
        self.config.write(&config)?;
        Ok(config)
    }

    pub fn set_blocked(&self, blocked: bool) -> Result<()> {
        let mut config = self.config.get()?;
        config.is_blocked = blocked;
        self.config.write(&config)?;
        self.log.info(if blocked { "User blocked" } else { "User unblocked" });
        Ok(())
    }

    /// Admins get the admin rank; revoking drops back to basic.
    pub fn set_admin(&self, admin: bool) -> Result<()> {
        let mut config = self.config.get()?;
        config.is_admin = admin;
        config.rank = if admin { Rank::Admin } else { Rank::Basic };
        self.config.write(&config)?;
        self.log.info(&format!("Admin flag set to {admin}, rank {}", config.rank));
        Ok(())
    }

    /// Make `name` the active preset and install its text as the instruction.
    pub fn apply_preset(&self, name: &str) -> Result<()> {
        let mut config = self.config.get()?;
        let text = config
            .preset(name)
            .ok_or_else(|| RecordError::UnknownPreset(name.to_string()))?
            .to_string();
        config.active_preset = name.to_string();
        self.config.write(&config)?;
        self.set_instruction(&text)
    }

    // ---- history ----

    pub fn load_history(&self) -> Result<Vec<Message>> {
        self.history.load()
    }

    /// Persist `history` with the system message pinned at index 0 and the
    /// oldest other messages dropped to fit the rank's limit. Returns how many
    /// messages were dropped.
    pub fn save_history(&self, history: &[Message]) -> Result<usize> {
        let limit = self.history_limit()?;
        let trimmed = self.history.save(history, limit)?;
        if trimmed > 0 {
            debug!(user = self.id(), trimmed, limit, "Trimmed history");
        }
        Ok(trimmed)
    }

    /// Empty the history file. `load_history` returns `[]` until the next save.
    pub fn clear_history(&self) -> Result<()> {
        self.history.clear()
    }

    /// Replace the system instruction at index 0.
    ///
    /// A history without a leading system message is logged as an error on
    /// the user's log and left as is; this is not reported as a failure.
    pub fn set_instruction(&self, text: &str) -> Result<()> {
        let mut history = self.history.load()?;
        if let Err(e) = check_anchor(&history) {
            self.log.error(&format!("Cannot set instruction: {e}"));
            return Ok(());
        }
        history[0].content = text.to_string();
        self.save_history(&history)?;
        Ok(())
    }

    pub fn clear_log(&self) -> Result<()> {
        self.log.clear()
    }

    // ---- lifecycle ----

    /// Delete the three files and recreate them as for a new user.
    ///
    /// The file sink is reattached whether or not recreation succeeds.
    pub fn reset(&mut self) -> Result<()> {
        self.log.close();
        let recreated = self.recreate_files();
        let reopened = self.log.reopen();
        if let Err(e) = &recreated {
            warn!(user = self.id(), error = %e, "Reset failed");
        }
        recreated?;
        reopened?;

        info!(user = self.id(), "Reset user record");
        self.log.info("User data reset");
        Ok(())
    }

    fn recreate_files(&self) -> Result<()> {
        for path in [self.paths.log(), self.paths.history(), self.paths.config()] {
            remove_if_present(path)?;
        }
        std::fs::create_dir_all(self.paths.dir())
            .map_err(|e| RecordError::io(self.paths.dir(), e))?;
        create_record_files(&self.paths)
    }

    /// Close the log file and delete the record directory.
    pub fn remove(self) -> Result<()> {
        self.logs.detach(self.id());
        std::fs::remove_dir_all(self.paths.dir())
            .map_err(|e| RecordError::io(self.paths.dir(), e))?;
        info!(user = self.id(), "Removed user record");
        Ok(())
    }
}
