//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-curator\config.toml
//! - macOS: ~/Library/Application Support/music-curator/config.toml
//! - Linux: ~/.config/music-curator/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; defaults match the behavior the detection engine was tuned
//! against, so an absent file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library settings
    pub library: LibraryConfig,

    /// Duplicate detection tunables
    pub dedup: DedupConfig,
}

/// Library settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Path to the catalog database
    pub db_path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(crate::db::DEFAULT_DB_NAME),
        }
    }
}

/// Tunables for the duplicate detection engine.
///
/// The thresholds are configuration rather than hard-coded constants, but
/// the defaults are load-bearing: they are what the matching behavior and
/// the test suite were calibrated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum combined metadata similarity for a fuzzy match (0.0-1.0)
    pub fuzzy_threshold: f64,

    /// Maximum duration difference for fuzzy candidates, in milliseconds
    pub duration_tolerance_ms: i64,

    /// Bucket size for the duration-based catch-all pass, in milliseconds
    pub duration_bucket_ms: i64,

    /// Bitrate (kbps) treated as "full marks" when scoring quality
    pub max_bitrate: i64,

    /// Sample rate (Hz) treated as "full marks" when scoring quality
    pub max_sample_rate: i64,

    /// File size (bytes) treated as "full marks" when scoring quality
    pub max_file_size: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            duration_tolerance_ms: 2000,
            duration_bucket_ms: 5000,
            max_bitrate: 320,
            max_sample_rate: 96_000,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-curator"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
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

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
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

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    // Ensure directory exists
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

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
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[dedup]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.dedup.fuzzy_threshold = 0.9;
        config.library.db_path = PathBuf::from("/music/catalog.db");

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.dedup.fuzzy_threshold, 0.9);
        assert_eq!(parsed.library.db_path, PathBuf::from("/music/catalog.db"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Config with only some fields
        let toml = r#"
[dedup]
duration_tolerance_ms = 3000
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Specified field is set
        assert_eq!(config.dedup.duration_tolerance_ms, 3000);

        // Other fields use defaults
        assert_eq!(config.dedup.fuzzy_threshold, 0.85);
        assert_eq!(config.dedup.duration_bucket_ms, 5000);
        assert_eq!(config.library.db_path, PathBuf::from("music_curator.db"));
    }
}
