//! Physical character state and derived movement speed.
//!
//! Health conditions are free-form strings chosen by the oracle ("broken
//! leg", "bruised ribs"). Movement speed is recomputed from them with a
//! fixed keyword table; the oracle never decides speed directly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum health points.
pub const DEFAULT_MAX_HEALTH: u32 = 100;

/// Default health regained per simulated hour.
pub const DEFAULT_HEALTH_REGEN_PER_HOUR: u32 = 6;

/// Default base movement speed, in tiles per tick.
pub const DEFAULT_BASE_MOVE_SPEED: Decimal = Decimal::TWO;

/// Condition keywords and the speed multiplier each one imposes.
///
/// A condition matches when it contains the keyword (case-insensitive).
/// Only the first matching keyword applies to a given condition.
const SPEED_MODIFIERS: &[(&str, Decimal)] = &[
    ("unconscious", Decimal::ZERO),
    ("broken leg", Decimal::from_parts(5, 0, 0, false, 1)),
    ("broken ankle", Decimal::from_parts(5, 0, 0, false, 1)),
    ("sprain", Decimal::from_parts(75, 0, 0, false, 2)),
    ("limp", Decimal::from_parts(75, 0, 0, false, 2)),
    ("exhausted", Decimal::from_parts(8, 0, 0, false, 1)),
    ("tired", Decimal::from_parts(8, 0, 0, false, 1)),
];

/// Speed multiplier for one condition; `1` when no keyword matches.
pub fn condition_multiplier(condition: &str) -> Decimal {
    let lowered = condition.to_lowercase();
    SPEED_MODIFIERS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(Decimal::ONE, |(_, multiplier)| *multiplier)
}

/// Effective speed for a base speed and a list of conditions.
///
/// Multipliers compound. The result is never negative.
pub fn effective_move_speed(base: Decimal, conditions: &[String]) -> Decimal {
    conditions
        .iter()
        .map(|c| condition_multiplier(c))
        .fold(base, |speed, m| speed.saturating_mul(m))
        .max(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// CharacterState
// ---------------------------------------------------------------------------

/// Mutable physical state of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Current health points, `0..=max_health`.
    pub health: u32,
    /// Maximum health points.
    pub max_health: u32,
    /// Active conditions in the order they were acquired.
    pub health_conditions: Vec<String>,
    /// Speed with no conditions.
    pub base_move_speed: Decimal,
    effective_move_speed: Decimal,
}

impl CharacterState {
    /// A healthy character with the given base speed.
    pub const fn new(base_move_speed: Decimal) -> Self {
        Self {
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            health_conditions: Vec::new(),
            base_move_speed,
            effective_move_speed: base_move_speed,
        }
    }

    /// Speed after conditions, as of the last [`recompute_move_speed`](Self::recompute_move_speed).
    pub const fn effective_move_speed(&self) -> Decimal {
        self.effective_move_speed
    }

    /// Whether a condition with the same text (ignoring case) is active.
    pub fn has_condition(&self, condition: &str) -> bool {
        let wanted = condition.trim().to_lowercase();
        self.health_conditions
            .iter()
            .any(|c| c.to_lowercase() == wanted)
    }

    /// Regain up to `amount` health, stopping at `max_health`.
    ///
    /// Returns the health actually gained. An unconscious character does
    /// not recover on their own.
    pub fn regenerate(&mut self, amount: u32) -> u32 {
        if self.health == 0 || self.has_condition_keyword("unconscious") {
            return 0;
        }
        let after = self.health.saturating_add(amount).min(self.max_health);
        let gained = after.saturating_sub(self.health);
        self.health = after;
        gained
    }

    fn has_condition_keyword(&self, keyword: &str) -> bool {
        self.health_conditions
            .iter()
            .any(|c| c.to_lowercase().contains(keyword))
    }

    /// Recompute the derived speed from the current conditions.
    pub fn recompute_move_speed(&mut self) -> Decimal {
        self.effective_move_speed = effective_move_speed(self.base_move_speed, &self.health_conditions);
        self.effective_move_speed
    }
}

impl Default for CharacterState {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_MOVE_SPEED)
    }
}
