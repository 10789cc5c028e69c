//! Enumeration types shared across the workspace.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A step of the conversation pipeline that may call the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Generating the next spoken line for the current speaker.
    Dialogue,
    /// Extracting a structured action from a line that contains action markers.
    Action,
    /// Deciding whether an extracted action succeeds and what it changes.
    Outcome,
    /// Post-conversation summary for one participant.
    Reflection,
}

impl Stage {
    /// Lowercase label used in logs and stage records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::Action => "action",
            Self::Outcome => "outcome",
            Self::Reflection => "reflection",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which class of model a stage should be routed to.
///
/// Tiers are a routing choice only; the pipeline treats both identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap, low-latency model.
    #[default]
    Fast,
    /// Slower, more capable model.
    Smart,
}

/// How a stage finished, as reported in a stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The oracle answered and the answer was used.
    Succeeded,
    /// The oracle failed and a fallback was substituted.
    Degraded,
    /// The stage was skipped without an oracle call.
    Skipped,
}
