//! Conversation orchestration for the Hamlet village simulation.
//!
//! Two agents who meet may talk. Each conversation is a
//! [`ConversationSession`] driven by the [`DialogueManager`]: lines are
//! generated by the oracle, scanned for actions, resolved into validated
//! effects, and summed up in per-agent reflections when the talk ends.
//! Oracle calls happen on a bounded worker pool; agent state is only ever
//! written on the thread that calls [`DialogueManager::update`].
//!
//! # Modules
//!
//! - [`config`] -- YAML settings ([`DialogueConfig`])
//! - [`error`] -- [`DialogueError`] and [`InitiateRejection`]
//! - [`interpreter`] -- Marker scan and action extraction
//! - [`manager`] -- Session ownership, worker pool, completion queue
//! - [`prompt`] -- `minijinja` templates for each stage
//! - [`reflection`] -- End-of-conversation summaries
//! - [`resolver`] -- Outcome proposal and validation
//! - [`session`] -- The per-conversation state machine
//! - [`sink`] -- Stage record destinations

pub mod config;
pub mod error;
pub mod interpreter;
pub mod manager;
pub mod prompt;
pub mod reflection;
pub mod resolver;
pub mod session;
pub mod sink;

pub use config::{ConfigError, DialogueConfig, StageSetting, StageSettings};
pub use error::{DialogueError, InitiateRejection};
pub use interpreter::{ActionDraft, ActionInterpreter, EmphasisMarkers, MarkerScan};
pub use manager::{DialogueManager, FALLBACK_LINE, UpdateReport};
pub use prompt::PromptEngine;
pub use reflection::{Reflection, Reflector};
pub use resolver::{Outcome, OutcomeResolver, ProposedOutcome};
pub use session::{ConversationSession, EntryKind, SessionState, TranscriptEntry};
pub use sink::{MemoryStageSink, StageSink, TracingStageSink};
