pub mod config;
pub mod error;
pub mod history;
mod json;
pub mod log;
pub mod paths;
pub mod rank;
pub mod record;

// Re-export key types
pub use chatkeep_config::Rank;
pub use config::{ConfigStore, UsageCounters, UserConfig};
pub use error::{RecordError, Result};
pub use history::{HistoryStore, Message, Role};
pub use log::{LogManager, UserLog};
pub use paths::{RecordPaths, RecordStatus};
pub use rank::RankPolicy;
pub use record::{RecordStore, UserRecord};
