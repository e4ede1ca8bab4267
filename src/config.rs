//! Engine configuration with TOML persistence
//!
//! Missing files are not fatal: [`EngineConfig::ensure_default`] writes the defaults on
//! first start and callers fall back to [`EngineConfig::default`] if loading fails.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const CONFIG_DIR: &str = "gesturekeys";
const CONFIG_FILE: &str = "engine.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

/// Timing, zone and startup settings for the engine and binary
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a Tap keeps its key down
    pub tap_duration_ms: u64,
    /// Minimum time between two taps of the same key
    pub cooldown_ms: u64,
    /// How long shutdown waits for the worker to drain
    pub shutdown_grace_ms: u64,
    /// Sampling cadence of the binary's tick loop
    pub tick_interval_ms: u64,
    pub left_zone: f64,
    pub right_zone: f64,
    /// Keys pressed once at start and held until shutdown
    pub hold_on_start: Vec<String>,
    /// Optional pose replay file for the scripted source
    pub replay_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tap_duration_ms: 50,
            cooldown_ms: 500,
            shutdown_grace_ms: 1000,
            tick_interval_ms: 33, // ~30 fps camera
            left_zone: 0.35,
            right_zone: 0.65,
            hold_on_start: vec!["u".to_string()],
            replay_path: None,
        }
    }
}

impl EngineConfig {
    pub fn tap_duration(&self) -> Duration {
        Duration::from_millis(self.tap_duration_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tap_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "tap_duration_ms must be positive".to_string(),
            ));
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_grace_ms must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.left_zone) || !in_range(self.right_zone) {
            return Err(ConfigError::Invalid(format!(
                "zones must lie within [0, 1], got {} / {}",
                self.left_zone, self.right_zone
            )));
        }
        if self.left_zone >= self.right_zone {
            return Err(ConfigError::Invalid(format!(
                "left_zone ({}) must be smaller than right_zone ({})",
                self.left_zone, self.right_zone
            )));
        }
        if self.hold_on_start.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "hold_on_start contains an empty key name".to_string(),
            ));
        }
        Ok(())
    }

    /// `<config dir>/gesturekeys/engine.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading engine config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Engine config saved to {}", path.display());
        Ok(())
    }

    /// Writes the default config if `path` does not exist yet
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            Self::default().save(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tap_duration(), Duration::from_millis(50));
        assert_eq!(config.cooldown(), Duration::from_millis(500));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = EngineConfig::from_toml_str("cooldown_ms = 250\n").unwrap();
        assert_eq!(config.cooldown_ms, 250);
        assert_eq!(config.tap_duration_ms, 50);
        assert_eq!(config.hold_on_start, vec!["u".to_string()]);
    }

    #[test]
    fn rejects_inverted_zones() {
        let err = EngineConfig::from_toml_str("left_zone = 0.7\nright_zone = 0.3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_tap_duration() {
        let err = EngineConfig::from_toml_str("tap_duration_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = EngineConfig::from_toml_str("cooldown_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn ensure_default_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        EngineConfig::ensure_default(&path).await.unwrap();
        let loaded = EngineConfig::load(&path).await.unwrap();

        assert_eq!(loaded, EngineConfig::default());
    }

    #[tokio::test]
    async fn ensure_default_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let custom = EngineConfig {
            cooldown_ms: 900,
            hold_on_start: Vec::new(),
            ..EngineConfig::default()
        };
        custom.save(&path).await.unwrap();

        EngineConfig::ensure_default(&path).await.unwrap();

        assert_eq!(EngineConfig::load(&path).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
