//! Configuration file support for the tracker.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/tracker/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default = "default_draft_file")]
    pub draft_file: String,

    #[serde(default = "default_settings_file")]
    pub settings_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            draft_file: default_draft_file(),
            settings_file: default_settings_file(),
        }
    }
}

/// Active workout session timing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_draft_debounce_ms")]
    pub draft_debounce_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            draft_debounce_ms: default_draft_debounce_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }

    /// Never zero, even for a config built in code without `validate`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config(
                "session.tick_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("tracker")
}

fn default_database_file() -> String {
    "tracker.db".into()
}

fn default_draft_file() -> String {
    "draft.json".into()
}

fn default_settings_file() -> String {
    "settings.json".into()
}

fn default_draft_debounce_ms() -> u64 {
    500
}

fn default_tick_interval_ms() -> u64 {
    250
}

impl DataConfig {
    /// Path of the SQLite database inside `data_dir`
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Path of the in-progress workout draft store
    pub fn draft_path(&self) -> PathBuf {
        self.data_dir.join(&self.draft_file)
    }

    /// Path of the user preference store
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(&self.settings_file)
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.session.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("tracker").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.database_file, "tracker.db");
        assert_eq!(config.session.draft_debounce(), Duration::from_millis(500));
        assert_eq!(config.session.tick_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().join("data");
        config.session.draft_debounce_ms = 750;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.data.data_dir, config.data.data_dir);
        assert_eq!(loaded.session.draft_debounce_ms, 750);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[session]
tick_interval_ms = 100
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.tick_interval_ms, 100);
        assert_eq!(config.session.draft_debounce_ms, 500); // default
        assert_eq!(config.data.draft_file, "draft.json");
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let session = SessionConfig {
            draft_debounce_ms: 0,
            tick_interval_ms: 0,
        };
        assert_eq!(session.tick_interval(), Duration::from_millis(1));
        assert_eq!(session.draft_debounce(), Duration::ZERO);
    }

    #[test]
    fn test_zero_tick_interval_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[session]\ntick_interval_ms = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_data_paths_live_under_data_dir() {
        let mut data = DataConfig::default();
        data.data_dir = PathBuf::from("/tmp/tracker-test");
        assert_eq!(data.database_path(), PathBuf::from("/tmp/tracker-test/tracker.db"));
        assert_eq!(data.draft_path(), PathBuf::from("/tmp/tracker-test/draft.json"));
        assert_eq!(data.settings_path(), PathBuf::from("/tmp/tracker-test/settings.json"));
    }
}
