use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub users: UsersConfig,
    pub ranks: RanksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsersConfig {
    /// Folder holding one record directory per user id.
    pub root: String,
    /// Lowest level written to each user's `user.log` ("debug", "info", "warn", "error").
    pub file_log_level: String,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            root: "~/.chatkeep/users".into(),
            file_log_level: "info".into(),
        }
    }
}

/// User tier. Drives the history limit and, elsewhere in the bot, quotas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    #[default]
    Basic,
    Plus,
    Vip,
    Admin,
}

impl Rank {
    pub fn as_str(&self) -> &str {
        match self {
            Rank::Basic => "basic",
            Rank::Plus => "plus",
            Rank::Vip => "vip",
            Rank::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "plus" => Some(Self::Plus),
            "vip" => Some(Self::Vip),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-rank policy table.
///
/// `historyLimits` maps each rank to the maximum number of messages kept in
/// a user's history, system instruction included. A rank missing from the
/// table is a configuration error, not an unlimited rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RanksConfig {
    pub history_limits: HashMap<Rank, i64>,
}

impl Default for RanksConfig {
    fn default() -> Self {
        Self {
            history_limits: HashMap::from([
                (Rank::Basic, 10),
                (Rank::Plus, 20),
                (Rank::Vip, 40),
                (Rank::Admin, 100),
            ]),
        }
    }
}
