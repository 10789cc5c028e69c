//! Dialogue engine configuration.
//!
//! Loaded from the `dialogue:` section of the YAML config file. Every field
//! has a default, so an empty document is a valid configuration. Turn caps,
//! cooldowns and pool size are plain parameters here, never constants in
//! the engine.

use std::path::Path;

use hamlet_types::{ModelTier, Stage};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::DialogueError;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DialogueConfig {
    /// Lines each participant may speak before the conversation concludes.
    #[serde(default = "default_max_turns_per_participant")]
    pub max_turns_per_participant: u32,

    /// Simulated seconds a pair must wait between conversations.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Oracle calls allowed in flight at once across all sessions.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// How long announcements stay on screen.
    #[serde(default = "default_announcement_duration_ticks")]
    pub announcement_duration_ticks: u32,

    /// Relationship decay toward neutral per simulated hour.
    #[serde(default = "default_decay_per_hour")]
    pub decay_per_hour: Decimal,

    /// Per-stage model tier and token caps.
    #[serde(default)]
    pub stages: StageSettings,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_turns_per_participant: default_max_turns_per_participant(),
            cooldown_secs: default_cooldown_secs(),
            worker_pool_size: default_worker_pool_size(),
            announcement_duration_ticks: default_announcement_duration_ticks(),
            decay_per_hour: default_decay_per_hour(),
            stages: StageSettings::default(),
        }
    }
}

impl DialogueConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yml::from_str(&contents)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), DialogueError> {
        if self.max_turns_per_participant == 0 {
            return Err(DialogueError::InvalidConfig(
                "max_turns_per_participant must be at least 1".to_owned(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(DialogueError::InvalidConfig(
                "worker_pool_size must be at least 1".to_owned(),
            ));
        }
        if self.decay_per_hour.is_sign_negative() {
            return Err(DialogueError::InvalidConfig(
                "decay_per_hour must not be negative".to_owned(),
            ));
        }
        Ok(())
    }

    /// Combined line cap for a session (both participants).
    pub const fn max_total_turns(&self) -> u32 {
        self.max_turns_per_participant.saturating_mul(2)
    }
}

/// Tier and token cap for each oracle-backed stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Line generation.
    pub dialogue: StageSetting,
    /// Action extraction.
    pub action: StageSetting,
    /// Outcome resolution.
    pub outcome: StageSetting,
    /// End-of-conversation reflection.
    pub reflection: StageSetting,
}

impl StageSettings {
    /// Settings for one stage.
    pub const fn get(&self, stage: Stage) -> &StageSetting {
        match stage {
            Stage::Dialogue => &self.dialogue,
            Stage::Action => &self.action,
            Stage::Outcome => &self.outcome,
            Stage::Reflection => &self.reflection,
        }
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            dialogue: StageSetting::new(ModelTier::Fast, 150),
            action: StageSetting::new(ModelTier::Fast, 200),
            outcome: StageSetting::new(ModelTier::Smart, 400),
            reflection: StageSetting::new(ModelTier::Fast, 200),
        }
    }
}

/// Tier and token cap for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StageSetting {
    /// Which backend tier serves the stage.
    #[serde(default)]
    pub tier: ModelTier,
    /// Output token cap.
    #[serde(default = "default_stage_max_tokens")]
    pub max_tokens: u32,
}

impl StageSetting {
    /// Construct a stage setting.
    pub const fn new(tier: ModelTier, max_tokens: u32) -> Self {
        Self { tier, max_tokens }
    }
}

const fn default_max_turns_per_participant() -> u32 {
    6
}

const fn default_cooldown_secs() -> u64 {
    30 * 60
}

const fn default_worker_pool_size() -> usize {
    3
}

const fn default_announcement_duration_ticks() -> u32 {
    180
}

const fn default_stage_max_tokens() -> u32 {
    300
}

const fn default_decay_per_hour() -> Decimal {
    hamlet_agents::relationship::DEFAULT_DECAY_PER_HOUR
}
