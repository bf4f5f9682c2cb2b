use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::models::ReadyState;

/// A 44-byte mono 8 kHz PCM WAV with an empty data chunk. Inaudible by construction.
pub const SILENT_WAV_DATA_URI: &str =
    "data:audio/wav;base64,UklGRiQAAABXQVZFZm10IBAAAAABAAEAQB8AAIA+AAACABAAZGF0YQAAAAA=";

/// What `play()` does when the readiness wait times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessPolicy {
    /// Attempt playback anyway; platforms sometimes under-report readiness
    #[default]
    Optimistic,
    /// Fail the session with a readiness timeout error
    Strict,
}

impl ReadinessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessPolicy::Optimistic => "optimistic",
            ReadinessPolicy::Strict => "strict",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "optimistic" => Some(ReadinessPolicy::Optimistic),
            "strict" => Some(ReadinessPolicy::Strict),
            _ => None,
        }
    }
}

/// Engine configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub readiness_timeout_ms: u64,
    pub readiness_policy: ReadinessPolicy,
    pub readiness_threshold: ReadyState,
    /// Distance from the end (seconds) at which the position monitor reports completion
    pub end_epsilon_secs: f64,
    pub silent_source: String,
    pub default_volume: f32,
    pub preferred_device: Option<String>,
    pub event_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 5000,
            readiness_policy: ReadinessPolicy::Optimistic,
            readiness_threshold: ReadyState::HaveFutureData,
            end_epsilon_secs: 0.05,
            silent_source: SILENT_WAV_DATA_URI.to_string(),
            default_volume: 1.0,
            preferred_device: None,
            event_history: 1000,
        }
    }
}

impl EngineConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: EngineConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config(&config_path).unwrap_or_default();

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Manager bound to an explicit file, loading it if present
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut EngineConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_readiness_timeout(&mut self, timeout_ms: u64) -> Result<(), ConfigError> {
        self.config.readiness_timeout_ms = timeout_ms;
        self.save_config()
    }

    pub fn set_readiness_policy(&mut self, policy: ReadinessPolicy) -> Result<(), ConfigError> {
        self.config.readiness_policy = policy;
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = EngineConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join("gesture-audio");

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&config_content)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: EngineConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();

        assert_eq!(config.readiness_timeout_ms, 5000);
        assert_eq!(config.readiness_timeout(), Duration::from_secs(5));
        assert_eq!(config.readiness_policy, ReadinessPolicy::Optimistic);
        assert_eq!(config.readiness_threshold, ReadyState::HaveFutureData);
        assert_eq!(config.end_epsilon_secs, 0.05);
        assert!(config.silent_source.starts_with("data:audio/wav;base64,"));
        assert_eq!(config.default_volume, 1.0);
        assert_eq!(config.preferred_device, None);
    }

    #[test]
    fn test_readiness_policy_parse() {
        assert_eq!(ReadinessPolicy::parse("Strict"), Some(ReadinessPolicy::Strict));
        assert_eq!(ReadinessPolicy::parse(" optimistic "), Some(ReadinessPolicy::Optimistic));
        assert_eq!(ReadinessPolicy::parse("lenient"), None);
        assert_eq!(ReadinessPolicy::Strict.as_str(), "strict");
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.readiness_timeout_ms = 1500;
        config_manager.config.readiness_policy = ReadinessPolicy::Strict;
        config_manager.config.preferred_device = Some("Test Device".to_string());
        config_manager.save_config().unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();

        assert_eq!(loaded_config.readiness_timeout_ms, 1500);
        assert_eq!(loaded_config.readiness_policy, ReadinessPolicy::Strict);
        assert_eq!(loaded_config.preferred_device, Some("Test Device".to_string()));
        assert_eq!(loaded_config, config_manager.config);
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent_path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigManager::load_config(&nonexistent_path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "readiness_policy = \"strict\"\n").unwrap();

        let config = ConfigManager::load_config(&config_path).unwrap();
        assert_eq!(config.readiness_policy, ReadinessPolicy::Strict);
        assert_eq!(config.readiness_timeout_ms, 5000);
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");

        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.update_config(|config| {
            config.end_epsilon_secs = 0.1;
            config.readiness_threshold = ReadyState::HaveEnoughData;
        }).unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded_config.end_epsilon_secs, 0.1);
        assert_eq!(loaded_config.readiness_threshold, ReadyState::HaveEnoughData);
    }

    #[test]
    fn test_set_volume_clamps() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_volume(0.7).unwrap();
        assert_eq!(config_manager.config.default_volume, 0.7);

        config_manager.set_volume(1.5).unwrap();
        assert_eq!(config_manager.config.default_volume, 1.0);

        config_manager.set_volume(-0.5).unwrap();
        assert_eq!(config_manager.config.default_volume, 0.0);
    }

    #[test]
    fn test_setters_persist() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_readiness_timeout(250).unwrap();
        config_manager.set_readiness_policy(ReadinessPolicy::Strict).unwrap();
        config_manager.set_preferred_device(Some("My DAC".to_string())).unwrap();

        let reloaded = ConfigManager::with_path(config_manager.config_path.clone()).unwrap();
        assert_eq!(reloaded.get_config().readiness_timeout_ms, 250);
        assert_eq!(reloaded.get_config().readiness_policy, ReadinessPolicy::Strict);
        assert_eq!(reloaded.get_config().preferred_device, Some("My DAC".to_string()));
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.readiness_timeout_ms = 1;
        config_manager.config.preferred_device = Some("Custom Device".to_string());
        config_manager.reset_to_defaults().unwrap();

        assert_eq!(config_manager.get_config(), &EngineConfig::default());
    }

    #[test]
    fn test_config_path_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("config").join("config.toml");

        let config_manager = ConfigManager {
            config: EngineConfig::default(),
            config_path: nested_path.clone(),
        };

        config_manager.save_config().unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_toml_format() {
        let config = EngineConfig {
            readiness_policy: ReadinessPolicy::Strict,
            preferred_device: Some("AudioQuest DragonFly".to_string()),
            ..Default::default()
        };

        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("readiness_timeout_ms = 5000"));
        assert!(toml_string.contains("readiness_policy = \"strict\""));
        assert!(toml_string.contains("readiness_threshold = \"have_future_data\""));
        assert!(toml_string.contains("AudioQuest DragonFly"));
    }
}
