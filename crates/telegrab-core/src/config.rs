use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// User ids granted access to the premium quality tier.
    /// Queried only; administration happens by editing this file.
    #[serde(default)]
    pub premium_users: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Bot API base URL (overridable for a local Bot API server).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long-poll timeout for getUpdates, seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Hard cap on the delivered file size, MiB.
    #[serde(default = "default_max_file_mib")]
    pub max_file_mib: u64,
    /// Deadline for audio/video retrieval jobs, seconds.
    #[serde(default = "default_media_timeout")]
    pub media_timeout_secs: u64,
    /// Deadline for plain file fetch jobs, seconds.
    #[serde(default = "default_generic_timeout")]
    pub generic_timeout_secs: u64,
    /// Connect/read timeout for the generic fetcher, seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Size of the blocking worker pool shared by all jobs.
    #[serde(default = "default_worker_pool")]
    pub worker_pool_size: usize,
}

/// User-configurable paths for downloads and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Working directory for in-flight downloads. Files here are transient;
    /// every job deletes its artifact on completion.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_mib: default_max_file_mib(),
            media_timeout_secs: default_media_timeout(),
            generic_timeout_secs: default_generic_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            worker_pool_size: default_worker_pool(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
        }
    }
}

impl LimitsConfig {
    /// The size cap in bytes, as compared against the on-disk file.
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mib * 1024 * 1024
    }
}

fn default_token_env() -> String {
    "BOT_TOKEN".to_string()
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_max_file_mib() -> u64 {
    50
}

fn default_media_timeout() -> u64 {
    900
}

fn default_generic_timeout() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_worker_pool() -> usize {
    3
}

fn default_downloads_dir() -> PathBuf {
    platform::data_dir().join("downloads")
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            limits: LimitsConfig::default(),
            paths: PathsConfig::default(),
            premium_users: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
