//! Molt Configuration
//!
//! Loads and saves the manager's configuration from `~/.molt/molt.json`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::types::{default_config, MoltConfig};

/// Config file name within the molt directory.
const CONFIG_FILENAME: &str = "molt.json";

/// Returns the molt home directory: `~/.molt`.
pub fn get_molt_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".molt")
}

/// Returns the full path to the config file: `~/.molt/molt.json`.
pub fn get_config_path() -> PathBuf {
    get_molt_dir().join(CONFIG_FILENAME)
}

/// Load the config from disk.
///
/// Reads `~/.molt/molt.json` and merges missing fields with defaults.
/// Returns `None` if the config file does not exist or cannot be parsed.
pub fn load_config() -> Option<MoltConfig> {
    let config_path = get_config_path();
    if !config_path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&config_path).ok()?;
    let mut config: MoltConfig = serde_json::from_str(&contents).ok()?;

    // Merge defaults for unset fields
    let defaults = default_config();

    if config.skill_roots.is_empty() {
        config.skill_roots = defaults.skill_roots;
    }
    if config.workspace_dir.is_empty() {
        config.workspace_dir = defaults.workspace_dir;
    }
    if config.scheduler_state_path.is_empty() {
        config.scheduler_state_path = defaults.scheduler_state_path;
    }
    if config.ledger_db_path.is_empty() {
        config.ledger_db_path = defaults.ledger_db_path;
    }
    if config.security_score_floor == 0 {
        config.security_score_floor = defaults.security_score_floor;
    }
    if config.logic_score_floor == 0 {
        config.logic_score_floor = defaults.logic_score_floor;
    }
    if config.max_concurrent_audits == 0 {
        config.max_concurrent_audits = defaults.max_concurrent_audits;
    }
    if config.optimizer_timeout_secs == 0 {
        config.optimizer_timeout_secs = defaults.optimizer_timeout_secs;
    }
    if config.daemon_tick_secs == 0 {
        config.daemon_tick_secs = defaults.daemon_tick_secs;
    }
    if config.max_skill_bytes == 0 {
        config.max_skill_bytes = defaults.max_skill_bytes;
    }

    Some(config)
}

/// Save the config to disk at `~/.molt/molt.json`.
///
/// Creates the molt directory if it does not exist.
pub fn save_config(config: &MoltConfig) -> Result<()> {
    let dir = get_molt_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create molt directory")?;
    }

    let config_path = get_config_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(&config_path, &json).context("Failed to write config file")?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
///
/// If the path starts with `~`, the tilde is replaced with the user's home
/// directory. Otherwise the path is returned as-is.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }

    #[test]
    fn test_default_config_values() {
        let config = default_config();
        assert_eq!(config.security_score_floor, 80);
        assert_eq!(config.logic_score_floor, 70);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.max_skill_bytes, 10 * 1024 * 1024);
        assert!(!config.skill_roots.is_empty());
    }

    #[test]
    fn test_config_round_trip_json() {
        let config = default_config();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: MoltConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.skill_roots, config.skill_roots);
        assert_eq!(parsed.optimizer_timeout_secs, config.optimizer_timeout_secs);
    }
}
