use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Synced bag with the user's block list (key `blockedWebsites`).
    #[serde(default = "default_sync_store_path")]
    pub sync_store_path: String,

    /// Local-only bag with rule assignments (keys `uuidToRuleIdMap`,
    /// `nextRuleId`).
    #[serde(default = "default_local_store_path")]
    pub local_store_path: String,

    /// Where the file-backed rule table stand-in keeps the active rules.
    #[serde(default = "default_rule_table_path")]
    pub rule_table_path: String,

    /// Redirect target for blocked navigations; handed verbatim to the rules.
    #[serde(default = "default_block_page_url")]
    pub block_page_url: String,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_enable")]
    pub enable: bool,
    /// How often to check the synced bag for edits made by other processes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_sync_store_path() -> String {
    "blocked_websites.json".to_string()
}
fn default_local_store_path() -> String {
    "rule_assignments.json".to_string()
}
fn default_rule_table_path() -> String {
    "rule_table.json".to_string()
}
fn default_block_page_url() -> String {
    "/blocked.html".to_string()
}
fn default_watch_enable() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_store_path: default_sync_store_path(),
            local_store_path: default_local_store_path(),
            rule_table_path: default_rule_table_path(),
            block_page_url: default_block_page_url(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enable: default_watch_enable(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}
