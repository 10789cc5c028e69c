//! Shared type definitions for the Hamlet conversation engine.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for agents, sessions and requests
//! - [`time`] -- Simulated clock ([`SimTime`])
//! - [`enums`] -- Pipeline stages, model tiers, stage statuses
//! - [`effects`] -- Typed state deltas ([`Effect`])
//! - [`structs`] -- Personality, announcements and stage records

pub mod effects;
pub mod enums;
pub mod ids;
pub mod structs;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use effects::{Effect, MAX_LABEL_LEN, ShapeError};
pub use enums::{ModelTier, Stage, StageStatus};
pub use ids::{AgentId, RequestId, SessionId};
pub use structs::{Announcement, Personality, Placement, StageRecord};
pub use time::SimTime;
