use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chatkeep_config::Rank;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};
use crate::json;

pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_PRESET: &str = "default";

/// Request/token/cost totals over some period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
}

impl UsageCounters {
    fn add(&mut self, tokens: u64, cost: f64) {
        self.requests = self.requests.saturating_add(1);
        self.tokens = self.tokens.saturating_add(tokens);
        self.cost += cost;
    }
}

/// Per-user settings document stored as `user.cfg`.
///
/// Every key is required when reading: a document with a field missing is
/// reported as corrupted rather than silently filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub chat_id: String,
    pub language: String,
    pub rank: Rank,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub is_removed: bool,
    pub lifetime_usage: UsageCounters,
    pub daily_usage: UsageCounters,
    #[serde(deserialize_with = "Option::deserialize")]
    pub last_request_at: Option<DateTime<Utc>>,
    pub default_preset: String,
    pub active_preset: String,
    pub presets: BTreeMap<String, String>,
}

impl UserConfig {
    /// Fresh default document for a new record.
    pub fn default_for(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            language: DEFAULT_LANGUAGE.into(),
            rank: Rank::Basic,
            is_admin: false,
            is_blocked: false,
            is_removed: false,
            lifetime_usage: UsageCounters::default(),
            daily_usage: UsageCounters::default(),
            last_request_at: None,
            default_preset: DEFAULT_PRESET.into(),
            active_preset: DEFAULT_PRESET.into(),
            presets: builtin_presets(),
        }
    }

    /// Account for one model request. Daily counters start over when `now`
    /// falls on a different UTC day than the previous request. Token counts
    /// saturate at `u64::MAX`.
    ///
    /// A negative or non-finite cost, or one that would push a total past
    /// `f64::MAX`, is rejected and leaves the document unchanged: JSON has no
    /// NaN or infinity, so such a value could not be read back.
    pub fn record_request(&mut self, tokens: u64, cost: f64, now: DateTime<Utc>) -> Result<()> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(RecordError::InvalidUsage(format!(
                "cost must be a finite non-negative number, got {cost}"
            )));
        }
        if !(self.lifetime_usage.cost + cost).is_finite() {
            return Err(RecordError::InvalidUsage(format!(
                "cost {cost} overflows the lifetime total"
            )));
        }

        let same_day = self
            .last_request_at
            .is_some_and(|last| last.date_naive() == now.date_naive());
        if !same_day {
            self.daily_usage = UsageCounters::default();
        }
        self.daily_usage.add(tokens, cost);
        self.lifetime_usage.add(tokens, cost);
        self.last_request_at = Some(now);
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&str> {
        self.presets.get(name).map(String::as_str)
    }
}

fn builtin_presets() -> BTreeMap<String, String> {
    BTreeMap::from([
        (DEFAULT_PRESET.to_string(), String::new()),
        (
            "concise".to_string(),
            "Answer briefly and without unnecessary text.".to_string(),
        ),
        (
            "tutor".to_string(),
            "Explain step by step, as you would to a student, and check understanding.".to_string(),
        ),
        (
            "translator".to_string(),
            "Translate every message into the user's preferred language. Reply with the translation only."
                .to_string(),
        ),
    ])
}

/// Reads and replaces a record's `user.cfg`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the initial document. Only the record creation sequence calls this.
    pub(crate) fn create(&self, config: &UserConfig) -> Result<()> {
        json::create_document(&self.path, config)
    }

    pub fn get(&self) -> Result<UserConfig> {
        // An empty file is no more a valid config than a missing key.
        let empty = || RecordError::Corrupted {
            path: self.path.clone(),
            source: serde::de::Error::custom("empty config document"),
        };
        json::read_document(&self.path)?.ok_or_else(empty)
    }

    /// Replace the whole document. Fails if the file is gone.
    pub fn write(&self, config: &UserConfig) -> Result<()> {
        json::overwrite_document(&self.path, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_with_default(dir: &TempDir) -> ConfigStore {
        let store = ConfigStore::new(&dir.path().join("user.cfg"));
        store.create(&UserConfig::default_for("u1")).unwrap();
        store
    }

    #[test]
    fn test_default_document() {
        let cfg = UserConfig::default_for("42");
        assert_eq!(cfg.chat_id, "42");
        assert_eq!(cfg.rank, Rank::Basic);
        assert!(!cfg.is_admin && !cfg.is_blocked && !cfg.is_removed);
        assert_eq!(cfg.lifetime_usage, UsageCounters::default());
        assert_eq!(cfg.daily_usage, UsageCounters::default());
        assert!(cfg.last_request_at.is_none());
        assert_eq!(cfg.active_preset, "default");
        assert_eq!(cfg.preset("default"), Some(""));
        assert!(cfg.preset("concise").is_some());
    }

    #[test]
    fn test_default_is_fresh_per_call() {
        let mut a = UserConfig::default_for("a");
        a.presets.insert("mine".into(), "custom".into());
        let b = UserConfig::default_for("b");
        assert!(b.preset("mine").is_none());
        assert_eq!(b.chat_id, "b");
    }

    #[test]
    fn test_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_with_default(&dir);
        assert_eq!(store.get().unwrap(), UserConfig::default_for("u1"));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"chatId\": \"u1\""));
        assert!(raw.contains("\"rank\": \"basic\""));
        assert!(raw.contains("\"lastRequestAt\": null"));
    }

    #[test]
    fn test_write_replaces_document() {
        let dir = TempDir::new().unwrap();
        let store = store_with_default(&dir);

        let mut cfg = store.get().unwrap();
        cfg.rank = Rank::Vip;
        cfg.language = "en".into();
        store.write(&cfg).unwrap();

        let loaded = store.get().unwrap();
        assert_eq!(loaded.rank, Rank::Vip);
        assert_eq!(loaded.language, "en");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(&dir.path().join("user.cfg"));
        assert!(store.get().unwrap_err().is_missing());
        assert!(store
            .write(&UserConfig::default_for("u1"))
            .unwrap_err()
            .is_missing());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_absent_key_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = store_with_default(&dir);

        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("lastRequestAt");
        std::fs::write(store.path(), value.to_string()).unwrap();
        assert!(store.get().unwrap_err().is_corrupted());

        value.as_object_mut().unwrap().remove("rank");
        std::fs::write(store.path(), value.to_string()).unwrap();
        assert!(store.get().unwrap_err().is_corrupted());
    }

    #[test]
    fn test_empty_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = store_with_default(&dir);
        std::fs::write(store.path(), "").unwrap();
        assert!(store.get().unwrap_err().is_corrupted());
    }

    #[test]
    fn test_record_request_rolls_daily_counters() {
        let mut cfg = UserConfig::default_for("u1");
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let day1_later = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap();

        cfg.record_request(100, 0.5, day1).unwrap();
        cfg.record_request(50, 0.25, day1_later).unwrap();
        assert_eq!(cfg.daily_usage.requests, 2);
        assert_eq!(cfg.daily_usage.tokens, 150);

        cfg.record_request(10, 0.125, day2).unwrap();
        assert_eq!(cfg.daily_usage.requests, 1);
        assert_eq!(cfg.daily_usage.tokens, 10);
        assert_eq!(cfg.lifetime_usage.requests, 3);
        assert_eq!(cfg.lifetime_usage.tokens, 160);
        assert_eq!(cfg.lifetime_usage.cost, 0.875);
        assert_eq!(cfg.last_request_at, Some(day2));
    }

    #[test]
    fn test_record_request_rejects_bad_cost() {
        let mut cfg = UserConfig::default_for("u1");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        cfg.record_request(5, 1.0, now).unwrap();
        let before = cfg.clone();

        for cost in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5] {
            let err = cfg.record_request(1, cost, now).unwrap_err();
            assert!(matches!(err, RecordError::InvalidUsage(_)), "accepted {cost}");
            assert_eq!(cfg, before);
        }

        cfg.lifetime_usage.cost = f64::MAX;
        let before = cfg.clone();
        let err = cfg.record_request(1, f64::MAX, now).unwrap_err();
        assert!(matches!(err, RecordError::InvalidUsage(_)));
        assert_eq!(cfg, before);
    }

    #[test]
    fn test_token_counters_saturate() {
        let mut cfg = UserConfig::default_for("u1");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        cfg.record_request(u64::MAX, 0.0, now).unwrap();
        cfg.record_request(1, 0.0, now).unwrap();
        assert_eq!(cfg.lifetime_usage.tokens, u64::MAX);
        assert_eq!(cfg.daily_usage.tokens, u64::MAX);
        assert_eq!(cfg.lifetime_usage.requests, 2);
    }
}
