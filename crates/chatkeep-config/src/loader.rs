use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::Config;

/// Resolve the users root, expanding ~ to the home directory.
pub fn resolve_root(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.join(path.strip_prefix("~/").unwrap_or(""));
        }
    }
    PathBuf::from(path)
}

/// Find the config file by searching standard locations.
pub fn find_config_path() -> PathBuf {
    // 1. Current directory
    let local = Path::new("config.json");
    if local.exists() {
        return local.to_path_buf();
    }

    // 2. ~/.chatkeep/config.json
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".chatkeep").join("config.json");
        if home_config.exists() {
            return home_config;
        }
    }

    // Default: ~/.chatkeep/config.json (will use defaults if missing)
    dirs::home_dir()
        .map(|h| h.join(".chatkeep").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

/// Load configuration from a JSON file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config '{}'", path.display()))?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rank;

    #[test]
    fn test_resolve_root_plain_path() {
        assert_eq!(resolve_root("/srv/users"), PathBuf::from("/srv/users"));
        assert_eq!(resolve_root("users"), PathBuf::from("users"));
    }

    #[test]
    fn test_resolve_root_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_root("~/bot/users"), home.join("bot/users"));
        }
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg.users.file_log_level, "info");
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "users": { "root": "/data/users" }, "ranks": { "historyLimits": { "plus": 33 } } }"#,
        )
        .unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.users.root, "/data/users");
        assert_eq!(loaded.users.file_log_level, "info");
        assert_eq!(loaded.ranks.history_limits.get(&Rank::Plus), Some(&33));
    }
}
