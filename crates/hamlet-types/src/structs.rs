//! Plain data structs shared between the agent, dialogue and engine crates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{Stage, StageStatus};
use crate::ids::{AgentId, SessionId};

// ---------------------------------------------------------------------------
// Personality
// ---------------------------------------------------------------------------

/// Fixed personality vector. Every trait lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    /// Warmth toward others; the main input to willingness to talk.
    pub friendliness: Decimal,
    /// Tendency to tell the truth.
    pub honesty: Decimal,
    /// Appetite for gold and possessions.
    pub greed: Decimal,
    /// Willingness to take physical risks.
    pub bravery: Decimal,
    /// Interest in new people and ideas.
    pub curiosity: Decimal,
    /// Tolerance for long or difficult conversations.
    pub patience: Decimal,
}

impl Personality {
    /// Build a personality, clamping every trait into `[0, 1]`.
    pub fn new(
        friendliness: Decimal,
        honesty: Decimal,
        greed: Decimal,
        bravery: Decimal,
        curiosity: Decimal,
        patience: Decimal,
    ) -> Self {
        Self {
            friendliness: clamp_unit(friendliness),
            honesty: clamp_unit(honesty),
            greed: clamp_unit(greed),
            bravery: clamp_unit(bravery),
            curiosity: clamp_unit(curiosity),
            patience: clamp_unit(patience),
        }
    }

    /// Short prose description of the strongest traits, for prompts.
    pub fn describe(&self) -> String {
        let high = Decimal::new(7, 1);
        let low = Decimal::new(3, 1);
        let traits = [
            (self.friendliness, "friendly", "standoffish"),
            (self.honesty, "honest", "sly"),
            (self.greed, "greedy", "generous"),
            (self.bravery, "brave", "timid"),
            (self.curiosity, "curious", "incurious"),
            (self.patience, "patient", "impatient"),
        ];
        let words: Vec<&str> = traits
            .iter()
            .filter_map(|(value, hi, lo)| {
                if *value >= high {
                    Some(*hi)
                } else if *value <= low {
                    Some(*lo)
                } else {
                    None
                }
            })
            .collect();
        if words.is_empty() {
            "even-tempered".to_owned()
        } else {
            words.join(", ")
        }
    }
}

impl Default for Personality {
    fn default() -> Self {
        let mid = Decimal::new(5, 1);
        Self::new(mid, mid, mid, mid, mid, mid)
    }
}

fn clamp_unit(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

// ---------------------------------------------------------------------------
// Announcements
// ---------------------------------------------------------------------------

/// Where the presentation layer should draw an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Centered on screen.
    Centered,
    /// Anchored above a grid position.
    Anchored {
        /// Grid column.
        x: i32,
        /// Grid row.
        y: i32,
    },
}

/// On-screen notice for a state-changing action outcome.
///
/// Only produced when an applied effect batch actually changed something;
/// ordinary conversation turns never announce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Session whose action produced the change.
    pub session_id: SessionId,
    /// Human-readable text.
    pub text: String,
    /// Screen placement.
    pub placement: Placement,
    /// How many ticks to keep it visible.
    pub duration_ticks: u32,
}

// ---------------------------------------------------------------------------
// Stage records
// ---------------------------------------------------------------------------

/// Structured log record for one pipeline stage of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Session the stage belongs to.
    pub session_id: SessionId,
    /// Agent the stage was run for, when there is one.
    pub speaker: Option<AgentId>,
    /// Pipeline stage.
    pub stage: Stage,
    /// Truncated description of the stage input.
    pub input_summary: String,
    /// How the stage finished.
    pub status: StageStatus,
    /// Truncated description of the stage result.
    pub result: String,
    /// Wall-clock latency of the oracle work, in milliseconds.
    pub latency_ms: u64,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}
