//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playrank\config.toml
//! - macOS: ~/Library/Application Support/playrank/config.toml
//! - Linux: ~/.config/playrank/config.toml
//!
//! Every section falls back to defaults field by field, so a file only
//! needs the values it overrides. Durations are plain integers with the
//! unit in the field name.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::cache::CacheLimits;
use crate::enrichment::ExecutorConfig;
use crate::history::HistoryLimits;
use crate::maintenance::MaintenanceConfig;
use crate::scheduler::SchedulerConfig;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache limits and history retention
    pub cache: CacheConfig,

    /// Enrichment queue tuning
    pub scheduler: SchedulerSection,

    /// Cleanup cadence and health thresholds
    pub maintenance: MaintenanceSection,

    /// Catalog lookups and rate limiting
    pub enrichment: EnrichmentSection,

    /// Durable store location
    pub store: StoreConfig,

    /// Library export location
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enrichment_max_age_days: i64,
    pub enrichment_max_entries: usize,

    pub artwork_max_age_days: i64,
    pub artwork_max_entries: usize,
    /// Aggregate artwork byte ceiling in megabytes
    pub artwork_max_mb: u64,
    /// Max age of the currently-displayed artwork slot
    pub current_artwork_max_age_days: i64,

    pub search_max_age_days: i64,
    pub search_max_entries: usize,

    /// Rank snapshots kept per sort configuration
    pub history_max_snapshots: usize,
    pub history_retention_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enrichment_max_age_days: 90,
            enrichment_max_entries: 5_000,
            artwork_max_age_days: 30,
            artwork_max_entries: 500,
            artwork_max_mb: 50,
            current_artwork_max_age_days: 7,
            search_max_age_days: 30,
            search_max_entries: 2_000,
            history_max_snapshots: 10,
            history_retention_days: 30,
        }
    }
}

impl CacheConfig {
    pub fn enrichment_limits(&self) -> CacheLimits {
        CacheLimits {
            max_age: Duration::days(self.enrichment_max_age_days),
            max_entries: self.enrichment_max_entries,
            max_bytes: None,
        }
    }

    pub fn artwork_limits(&self) -> CacheLimits {
        CacheLimits {
            max_age: Duration::days(self.artwork_max_age_days),
            max_entries: self.artwork_max_entries,
            max_bytes: Some(self.artwork_max_mb.saturating_mul(1024 * 1024)),
        }
    }

    pub fn current_artwork_max_age(&self) -> Duration {
        Duration::days(self.current_artwork_max_age_days)
    }

    pub fn search_limits(&self) -> CacheLimits {
        CacheLimits {
            max_age: Duration::days(self.search_max_age_days),
            max_entries: self.search_max_entries,
            max_bytes: None,
        }
    }

    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            max_snapshots: self.history_max_snapshots,
            retention: Duration::days(self.history_retention_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Top/bottom window size per sort configuration
    pub window: usize,
    pub rebuild_cooldown_ms: i64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            window: 50,
            rebuild_cooldown_ms: 1_000,
        }
    }
}

impl SchedulerSection {
    pub fn to_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            window: self.window,
            rebuild_cooldown: Duration::milliseconds(self.rebuild_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub cleanup_interval_hours: i64,
    pub key_soft_threshold: usize,
    pub key_hard_ceiling: usize,
    /// Corrupted-entry ratio that forces a cleanup
    pub corruption_threshold: f64,
    pub emergency_enrichment_age_days: i64,
    pub emergency_artwork_age_days: i64,
    pub emergency_search_age_days: i64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            cleanup_interval_hours: 24,
            key_soft_threshold: 5_000,
            key_hard_ceiling: 10_000,
            corruption_threshold: 0.10,
            emergency_enrichment_age_days: 30,
            emergency_artwork_age_days: 7,
            emergency_search_age_days: 7,
        }
    }
}

impl MaintenanceSection {
    pub fn to_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            cleanup_interval: Duration::hours(self.cleanup_interval_hours),
            key_soft_threshold: self.key_soft_threshold,
            key_hard_ceiling: self.key_hard_ceiling,
            corruption_threshold: self.corruption_threshold,
            emergency_enrichment_age: Duration::days(self.emergency_enrichment_age_days),
            emergency_artwork_age: Duration::days(self.emergency_artwork_age_days),
            emergency_search_age: Duration::days(self.emergency_search_age_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    pub batch_size: usize,
    /// Lookups in flight within one batch
    pub concurrency: usize,
    /// Candidates requested per catalog search
    pub result_limit: usize,
    /// Minimum spacing between catalog requests
    pub request_interval_ms: u64,
    pub batch_delay_ms: u64,
    pub pass_cooldown_secs: i64,
    /// Stop a pass after this many batches (unset = drain the queue)
    pub max_batches_per_pass: Option<usize>,
    pub fetch_artwork: bool,
    /// Override for the MusicBrainz web service root
    pub musicbrainz_url: Option<String>,
    /// Override for the Cover Art Archive root
    pub coverart_url: Option<String>,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 4,
            result_limit: 5,
            request_interval_ms: 1_100,
            batch_delay_ms: 2_000,
            pass_cooldown_secs: 300,
            max_batches_per_pass: None,
            fetch_artwork: true,
            musicbrainz_url: None,
            coverart_url: None,
        }
    }
}

impl EnrichmentSection {
    pub fn to_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            batch_size: self.batch_size.max(1),
            concurrency: self.concurrency.max(1),
            result_limit: self.result_limit.max(1),
            request_interval: StdDuration::from_millis(self.request_interval_ms),
            batch_delay: StdDuration::from_millis(self.batch_delay_ms),
            pass_cooldown: Duration::seconds(self.pass_cooldown_secs),
            max_batches_per_pass: self.max_batches_per_pass,
            fetch_artwork: self.fetch_artwork,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path (unset = [`default_database_path`])
    pub database_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Configured path, else the data-directory default, else the working
    /// directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(default_database_path)
            .unwrap_or_else(|| PathBuf::from(crate::store::DEFAULT_DB_NAME))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// JSON library export read by the CLI
    pub export_path: Option<PathBuf>,
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("playrank"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default SQLite database location under the OS data directory
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("playrank").join(crate::store::DEFAULT_DB_NAME))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[scheduler]"));
        assert!(toml.contains("[maintenance]"));
        assert!(toml.contains("[enrichment]"));
    }

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.to_config(), SchedulerConfig::default());
        assert_eq!(config.maintenance.to_config(), MaintenanceConfig::default());
        assert_eq!(config.enrichment.to_config(), ExecutorConfig::default());
        assert_eq!(config.cache.history_limits(), HistoryLimits::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[cache]
artwork_max_mb = 10

[enrichment]
concurrency = 2
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.cache.artwork_limits().max_bytes, Some(10 * 1024 * 1024));
        assert_eq!(config.cache.enrichment_max_entries, 5_000);
        assert_eq!(config.enrichment.concurrency, 2);
        assert_eq!(config.enrichment.batch_size, 10);
        assert_eq!(config.scheduler.window, 50);
    }

    #[test]
    fn test_cache_limits() {
        let cache = CacheConfig::default();
        assert_eq!(cache.enrichment_limits().max_age, Duration::days(90));
        assert_eq!(cache.enrichment_limits().max_bytes, None);
        assert_eq!(cache.search_limits().max_entries, 2_000);
        assert_eq!(cache.current_artwork_max_age(), Duration::days(7));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.scheduler.window = 20;
        config.store.database_path = Some(PathBuf::from("/tmp/ranks.db"));
        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path), config);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler\nwindow = ").unwrap();
        assert_eq!(load_from(&path), Config::default());
    }

    #[test]
    fn test_database_path_override() {
        let store = StoreConfig {
            database_path: Some(PathBuf::from("/data/x.db")),
        };
        assert_eq!(store.resolved_database_path(), PathBuf::from("/data/x.db"));
    }
}
