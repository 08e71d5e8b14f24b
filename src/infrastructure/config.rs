//! Configuration infrastructure
//!
//! Configuration is a single JSON document with one section per concern:
//! remote source, sessions, ingestion, tagging, database and logging. Missing
//! files are created with defaults on first run.

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

/// Environment variable pointing at an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "ASCENSION_TRACKER_CONFIG";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    /// One Session Worker is started per entry
    pub sessions: Vec<SessionCredentials>,
    pub ingestion: IngestionConfig,
    pub tagging: TaggingConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Remote source endpoints and request behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    /// Per-session request quota
    pub max_requests_per_second: u32,
    /// Sleep between refetches while the nightly maintenance window is open
    pub maintenance_retry_seconds: u64,
    pub recent_ascenders_path: String,
}

impl RemoteConfig {
    #[must_use]
    pub const fn maintenance_retry_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_retry_seconds)
    }
}

/// Login for one remote session
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Worker pool and batching behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Candidate ids dispatched before accumulated results are flushed to the store
    pub batch_size: usize,
    /// Consecutive blank ids that end a range scan
    pub consecutive_blank_threshold: u32,
}

/// Tagging engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Runs before this date never count as record-breaking
    pub ns13_cutoff: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files; next to the executable when unset
    pub directory: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            maintenance_retry_seconds: defaults::MAINTENANCE_RETRY_SECONDS,
            recent_ascenders_path: defaults::RECENT_ASCENDERS_PATH.to_string(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            consecutive_blank_threshold: defaults::CONSECUTIVE_BLANK_THRESHOLD,
        }
    }
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            ns13_cutoff: defaults::ns13_cutoff(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
            max_files: defaults::LOG_MAX_FILES,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Configuration file from `ASCENSION_TRACKER_CONFIG`, else the user config directory
    pub fn new() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(Self::with_path(path));
        }
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration could not be parsed: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    use chrono::NaiveDate;

    pub const APP_DIR_NAME: &str = "ascension-tracker";
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Remote source root; relative page paths are joined onto it
    pub const BASE_URL: &str = "https://www.kingdomofloathing.com/";

    pub const USER_AGENT: &str = "ascension-tracker/0.3";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const MAX_REQUESTS_PER_SECOND: u32 = 2;

    /// Fixed wait between refetches during the nightly rollover
    pub const MAINTENANCE_RETRY_SECONDS: u64 = 60;

    pub const RECENT_ASCENDERS_PATH: &str = "museum.php?floor=1&place=leaderboards&whichboard=999";

    pub const BATCH_SIZE: usize = 100;

    pub const CONSECUTIVE_BLANK_THRESHOLD: u32 = 10;

    pub const DATABASE_URL: &str = "sqlite://ascension-tracker.db";

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_MAX_FILES: u32 = 5;

    /// Release date of the Naughty Sorceress revamp; record analytics start here
    #[must_use]
    pub fn ns13_cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 2, 2).unwrap_or(NaiveDate::MIN)
    }
}
