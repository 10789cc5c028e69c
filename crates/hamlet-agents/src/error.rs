//! Error types for the hamlet-agents crate.
//!
//! All operations that can fail return typed errors rather than panicking.

use hamlet_types::{AgentId, ShapeError};

/// Errors that can occur during agent state operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Agent with the given ID is not in the world.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// An agent with this ID was already inserted.
    #[error("duplicate agent: {0}")]
    DuplicateAgent(AgentId),

    /// Attempted to remove more of an item than the agent holds.
    #[error("missing item: wanted {requested} of {item} but only have {available}")]
    MissingItem {
        /// Normalized item name.
        item: String,
        /// The quantity the caller attempted to remove.
        requested: u32,
        /// The quantity the agent actually holds.
        available: u32,
    },

    /// A proposed effect was rejected during validation.
    #[error("invalid {tag} effect: {reason}")]
    InvalidEffect {
        /// The effect's tag (see `Effect::tag`).
        tag: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// An arithmetic overflow occurred while updating state.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },
}

impl AgentError {
    /// Build an [`AgentError::InvalidEffect`] from a structural check failure.
    pub fn from_shape(tag: &'static str, error: &ShapeError) -> Self {
        Self::InvalidEffect {
            tag,
            reason: error.to_string(),
        }
    }
}
