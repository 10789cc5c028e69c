//! Agent state, relationships, cooldowns and effect application for Hamlet.
//!
//! This crate holds everything that reads or writes agent state without
//! touching I/O. It sits between `hamlet-types` and the dialogue engine.
//!
//! # Modules
//!
//! - [`agent`] -- The [`Agent`] record
//! - [`character`] -- Health conditions and derived movement speed
//! - [`error`] -- Error types for all agent operations ([`AgentError`])
//! - [`inventory`] -- Item multiset with normalized names
//! - [`relationship`] -- Feeling scores, history, notes, decay
//! - [`state_manager`] -- Effect validation and atomic application
//! - [`willingness`] -- Whether an agent agrees to talk
//! - [`world`] -- The world context: agent table and cooldowns

pub mod agent;
pub mod character;
pub mod error;
pub mod inventory;
pub mod relationship;
pub mod state_manager;
pub mod willingness;
pub mod world;

pub use agent::Agent;
pub use character::CharacterState;
pub use error::AgentError;
pub use inventory::Inventory;
pub use relationship::Relationship;
pub use state_manager::{AppliedSummary, ValidatedBatch};
pub use willingness::{ChanceWillingness, WillingnessCheck};
pub use world::{CooldownMap, PairKey, World};
