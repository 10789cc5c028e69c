//! Error types for the dialogue engine.

use hamlet_agents::AgentError;
use hamlet_oracle::OracleError;
use hamlet_types::{AgentId, SessionId, SimTime};

use crate::session::SessionState;

/// Errors raised while driving conversations.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    /// Failed to load or render a prompt template.
    #[error("template error: {0}")]
    Template(String),

    /// A session was asked to make a transition its state machine forbids.
    #[error("session {session_id}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// The session.
        session_id: SessionId,
        /// State it was in.
        from: SessionState,
        /// State it was asked to enter.
        to: SessionState,
    },

    /// A second oracle request was submitted while one was in flight.
    #[error("session {0}: an oracle request is already in flight")]
    RequestInFlight(SessionId),

    /// Configuration failed validation.
    #[error("invalid dialogue config: {0}")]
    InvalidConfig(String),

    /// Agent state operation failed.
    #[error("agent error: {source}")]
    Agent {
        /// The underlying agent error.
        #[from]
        source: AgentError,
    },

    /// Oracle call failed.
    #[error("oracle error: {source}")]
    Oracle {
        /// The underlying oracle error.
        #[from]
        source: OracleError,
    },
}

/// Why [`DialogueManager::try_initiate`](crate::manager::DialogueManager::try_initiate)
/// declined to start a conversation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitiateRejection {
    /// The pair talked recently.
    #[error("pair is on cooldown until {until}")]
    OnCooldown {
        /// When the cooldown lifts.
        until: SimTime,
    },

    /// One of the two declined.
    #[error("agent {agent} is unwilling to talk")]
    Unwilling {
        /// The agent who declined.
        agent: AgentId,
    },

    /// One of the two is already in a conversation.
    #[error("agent {agent} is already in a conversation")]
    AlreadyInSession {
        /// The busy agent.
        agent: AgentId,
    },

    /// One of the IDs is not in the world.
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    /// Both IDs are the same agent.
    #[error("an agent cannot converse with themself")]
    SameAgent,

    /// The manager has been shut down.
    #[error("dialogue manager is shut down")]
    ShuttingDown,
}
