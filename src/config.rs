use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the export lives and how it is streamed.
#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_url")]
    pub url: String,
    /// Basename of the single hierarchy entry inside the archive.
    #[serde(default = "default_hierarchy_entry")]
    pub hierarchy_entry: String,
    /// Wall-clock bound for the whole download, body included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Decompressed entries buffered between the reader thread and the sync loop.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            url: default_archive_url(),
            hierarchy_entry: default_hierarchy_entry(),
            timeout_secs: default_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_archive_url() -> String {
    "https://lecomarquage.service-public.fr/vdd/3.3/part/zip/vosdroits-latest.zip".to_string()
}
fn default_hierarchy_entry() -> String {
    "arborescence.xml".to_string()
}
fn default_timeout_secs() -> u64 {
    900
}
fn default_channel_capacity() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Buffered documents before a batch write is issued.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Maximum rows per store write call.
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,
    /// A `running` log row older than this no longer blocks a new sync.
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            batch_ceiling: default_batch_ceiling(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

fn default_flush_threshold() -> usize {
    500
}
fn default_batch_ceiling() -> usize {
    100
}
fn default_stale_lock_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration with every optional section at its default.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            archive: ArchiveConfig::default(),
            sync: SyncConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.archive.url.starts_with("http://") || self.archive.url.starts_with("https://")) {
            anyhow::bail!("archive.url must be an http(s) URL, got '{}'", self.archive.url);
        }
        if self.archive.hierarchy_entry.trim().is_empty() {
            anyhow::bail!("archive.hierarchy_entry must not be empty");
        }
        if self.archive.timeout_secs == 0 {
            anyhow::bail!("archive.timeout_secs must be > 0");
        }
        if self.archive.channel_capacity == 0 {
            anyhow::bail!("archive.channel_capacity must be > 0");
        }
        if self.sync.flush_threshold == 0 {
            anyhow::bail!("sync.flush_threshold must be > 0");
        }
        if self.sync.batch_ceiling == 0 {
            anyhow::bail!("sync.batch_ceiling must be > 0");
        }
        if self.search.default_limit < 1 {
            anyhow::bail!("search.default_limit must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
