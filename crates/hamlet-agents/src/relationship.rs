//! One agent's view of another.
//!
//! Feeling scores live in `[-1, 1]` and are clamped on every write. Scores
//! drift back toward neutral while two agents do not interact. History and
//! notes are bounded; the oldest entries fall off first.

use std::collections::VecDeque;

use hamlet_types::SimTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum feeling score.
const FEELING_MAX: Decimal = Decimal::ONE;

/// Minimum feeling score.
const FEELING_MIN: Decimal = Decimal::NEGATIVE_ONE;

/// Conversation summaries kept per relationship.
pub const HISTORY_CAPACITY: usize = 10;

/// Observations kept per relationship.
pub const NOTES_CAPACITY: usize = 5;

/// Default decay toward neutral per simulated hour (0.001).
pub const DEFAULT_DECAY_PER_HOUR: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// How one agent feels about another, and what they remember of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    feeling_score: Decimal,
    interaction_count: u64,
    history: VecDeque<String>,
    notes: VecDeque<String>,
    last_interaction: Option<SimTime>,
    decayed_through: SimTime,
}

impl Relationship {
    /// A neutral relationship with no shared past.
    pub const fn new() -> Self {
        Self {
            feeling_score: Decimal::ZERO,
            interaction_count: 0,
            history: VecDeque::new(),
            notes: VecDeque::new(),
            last_interaction: None,
            decayed_through: SimTime::ZERO,
        }
    }

    /// A relationship starting from a given score (clamped).
    pub fn with_feeling(score: Decimal) -> Self {
        let mut rel = Self::new();
        rel.feeling_score = clamp_feeling(score);
        rel
    }

    /// Current feeling score in `[-1, 1]`.
    pub const fn feeling_score(&self) -> Decimal {
        self.feeling_score
    }

    /// Number of completed conversations.
    pub const fn interaction_count(&self) -> u64 {
        self.interaction_count
    }

    /// Conversation summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Observations, oldest first.
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.notes.iter().map(String::as_str)
    }

    /// When the two last interacted, if ever.
    pub const fn last_interaction(&self) -> Option<SimTime> {
        self.last_interaction
    }

    /// Shift the feeling score by `delta`, clamping the result.
    ///
    /// Returns the new score.
    pub fn adjust_feeling(&mut self, delta: Decimal, now: SimTime) -> Decimal {
        self.feeling_score = clamp_feeling(self.feeling_score.saturating_add(delta));
        self.touch(now);
        self.feeling_score
    }

    /// Record a finished conversation: bump the counter and keep its summary.
    pub fn record_interaction(&mut self, summary: &str, now: SimTime) {
        self.interaction_count = self.interaction_count.saturating_add(1);
        push_bounded(&mut self.history, summary, HISTORY_CAPACITY);
        self.touch(now);
    }

    /// Keep a free-form observation about the other agent.
    pub fn add_note(&mut self, note: &str) {
        push_bounded(&mut self.notes, note, NOTES_CAPACITY);
    }

    /// Decay the score toward zero for the whole hours elapsed since the
    /// later of the last interaction and the previous decay step.
    ///
    /// Never crosses zero. Returns the new score.
    pub fn decay(&mut self, now: SimTime, per_hour: Decimal) -> Decimal {
        let since = self.last_interaction.map_or(self.decayed_through, |t| t.max(self.decayed_through));
        let hours = now.hours_since(since);
        if hours == 0 || self.feeling_score.is_zero() {
            return self.feeling_score;
        }
        let step = per_hour.saturating_mul(Decimal::from(hours));
        self.feeling_score = if self.feeling_score.is_sign_positive() {
            self.feeling_score.saturating_sub(step).max(Decimal::ZERO)
        } else {
            self.feeling_score.saturating_add(step).min(Decimal::ZERO)
        };
        self.decayed_through = since.plus_secs(hours.saturating_mul(3_600));
        self.feeling_score
    }

    /// Word for the current score, used in prompts.
    pub fn label(&self) -> &'static str {
        feeling_label(self.feeling_score)
    }

    fn touch(&mut self, now: SimTime) {
        self.last_interaction = Some(now);
        self.decayed_through = self.decayed_through.max(now);
    }
}

impl Default for Relationship {
    fn default() -> Self {
        Self::new()
    }
}

/// Word for a feeling score.
pub fn feeling_label(score: Decimal) -> &'static str {
    if score > Decimal::new(5, 1) {
        "close friend"
    } else if score > Decimal::new(2, 1) {
        "friendly"
    } else if score > Decimal::new(-2, 1) {
        "neutral"
    } else if score > Decimal::new(-5, 1) {
        "wary"
    } else {
        "hostile"
    }
}

fn clamp_feeling(score: Decimal) -> Decimal {
    score.clamp(FEELING_MIN, FEELING_MAX)
}

fn push_bounded(list: &mut VecDeque<String>, entry: &str, capacity: usize) {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return;
    }
    list.push_back(trimmed.to_owned());
    while list.len() > capacity {
        list.pop_front();
    }
}
