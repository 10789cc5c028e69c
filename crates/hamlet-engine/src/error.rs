//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup or the tick
//! loop, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration file could not be read or parsed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// A setting is out of range.
    #[error("invalid setting: {message}")]
    InvalidSetting {
        /// Which setting and why.
        message: String,
    },

    /// Oracle configuration was missing or invalid.
    #[error("oracle error: {source}")]
    Oracle {
        /// The underlying oracle error.
        #[from]
        source: hamlet_oracle::OracleError,
    },

    /// The dialogue engine rejected its settings or templates.
    #[error("dialogue error: {source}")]
    Dialogue {
        /// The underlying dialogue error.
        #[from]
        source: hamlet_dialogue::DialogueError,
    },

    /// An agent could not be added to the world.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: hamlet_agents::AgentError,
    },

    /// Villager spawning failed.
    #[error("spawner error: {message}")]
    Spawner {
        /// Description of the spawner failure.
        message: String,
    },
}
