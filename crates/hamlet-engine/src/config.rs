//! Engine configuration loaded from `hamlet-config.yaml`.
//!
//! The file has three sections: `village` (tick loop and grid),
//! `villagers` (seed population) and `dialogue` (handed to the dialogue
//! engine unchanged). Every section and field is optional.

use std::path::Path;

use hamlet_agents::character::DEFAULT_HEALTH_REGEN_PER_HOUR;
use hamlet_dialogue::DialogueConfig;
use serde::Deserialize;
use tracing::info;

use crate::error::EngineError;
use crate::spawner::SpawnerConfig;

pub use hamlet_dialogue::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "HAMLET_CONFIG";

/// Config file used when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "hamlet-config.yaml";

/// Root configuration for the engine binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Tick loop and grid settings.
    #[serde(default)]
    pub village: VillageSettings,
    /// Seed population.
    #[serde(default)]
    pub villagers: SpawnerConfig,
    /// Conversation engine settings.
    #[serde(default)]
    pub dialogue: DialogueConfig,
}

/// Tick loop and grid settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VillageSettings {
    /// Wall-clock milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Simulated seconds that pass each tick.
    #[serde(default = "default_secs_per_tick")]
    pub secs_per_tick: u64,

    /// Stop after this many ticks. Zero runs until interrupted.
    #[serde(default)]
    pub max_ticks: u64,

    /// RNG seed for spawning, wandering and willingness rolls.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Side length of the square village grid, in tiles.
    #[serde(default = "default_grid_size")]
    pub grid_size: u16,

    /// Two idle villagers within this many tiles may start talking.
    #[serde(default = "default_talk_radius")]
    pub talk_radius: u16,

    /// Ticks between relationship decay passes.
    #[serde(default = "default_decay_interval_ticks")]
    pub decay_interval_ticks: u64,

    /// Health each villager regains per simulated hour, applied on the
    /// decay pass.
    #[serde(default = "default_health_regen_per_hour")]
    pub health_regen_per_hour: u32,
}

impl Default for VillageSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            secs_per_tick: default_secs_per_tick(),
            max_ticks: 0,
            seed: None,
            grid_size: default_grid_size(),
            talk_radius: default_talk_radius(),
            decay_interval_ticks: default_decay_interval_ticks(),
            health_regen_per_hour: default_health_regen_per_hour(),
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    250
}

const fn default_secs_per_tick() -> u64 {
    10
}

const fn default_grid_size() -> u16 {
    24
}

const fn default_talk_radius() -> u16 {
    1
}

const fn default_decay_interval_ticks() -> u64 {
    360
}

const fn default_health_regen_per_hour() -> u32 {
    DEFAULT_HEALTH_REGEN_PER_HOUR
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            let config = Self::from_file(path)?;
            config.validate()?;
            Ok(config)
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.village.grid_size == 0 {
            return Err(EngineError::InvalidSetting {
                message: String::from("village.grid_size must be at least 1"),
            });
        }
        if self.village.secs_per_tick == 0 {
            return Err(EngineError::InvalidSetting {
                message: String::from("village.secs_per_tick must be at least 1"),
            });
        }
        self.dialogue.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.village.secs_per_tick, 10);
        assert_eq!(config.village.health_regen_per_hour, 6);
        assert_eq!(config.villagers.seed_count, 6);
        assert_eq!(config.dialogue.max_turns_per_participant, 6);
    }

    #[test]
    fn sections_override_independently() {
        let yaml = "\
village:
  seed: 42
  max_ticks: 500
villagers:
  seed_count: 3
dialogue:
  max_turns_per_participant: 2
  cooldown_secs: 60
";
        let config = EngineConfig::parse(yaml).unwrap();
        assert_eq!(config.village.seed, Some(42));
        assert_eq!(config.village.max_ticks, 500);
        assert_eq!(config.village.grid_size, 24);
        assert_eq!(config.villagers.seed_count, 3);
        assert_eq!(config.dialogue.max_turns_per_participant, 2);
        assert_eq!(config.dialogue.cooldown_secs, 60);
        assert_eq!(config.dialogue.worker_pool_size, 3);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(EngineConfig::parse("village: [unclosed").is_err());
    }

    #[test]
    fn zero_grid_is_rejected() {
        let mut config = EngineConfig::default();
        config.village.grid_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn dialogue_settings_are_validated_too() {
        let mut config = EngineConfig::default();
        config.dialogue.worker_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(EngineError::Dialogue { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "hamlet-engine-missing-{}-{:?}.yaml",
            std::process::id(),
            std::thread::current().id()
        ));
        let config = EngineConfig::load(&path).ok();
        assert_eq!(config, Some(EngineConfig::default()));
    }

    #[test]
    fn load_reads_an_existing_file() {
        let path = std::env::temp_dir().join(format!(
            "hamlet-engine-config-{}-{:?}.yaml",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, "village:\n  talk_radius: 3\n").unwrap();
        let config = EngineConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(config.unwrap().village.talk_radius, 3);
    }
}
