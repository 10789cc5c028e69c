//! State effects produced by resolved actions.
//!
//! An [`Effect`] is a single typed delta against one agent. Effects arrive
//! from the outcome resolver as proposals, are validated against live agent
//! state, and are then applied as one batch per party. Each variant has its
//! own structural check in [`Effect::check_shape`]; checks that need agent
//! state (balances, item counts) live next to the state they inspect.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Longest condition or item name accepted from the oracle.
pub const MAX_LABEL_LEN: usize = 64;

/// A typed change to one agent's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Append a free-form health condition (e.g. "broken leg").
    AddCondition {
        /// The condition text.
        condition: String,
    },
    /// Remove a health condition the agent currently has.
    RemoveCondition {
        /// The condition text.
        condition: String,
    },
    /// Change health points.
    Health {
        /// Signed change in health points.
        delta: i32,
    },
    /// Change the gold balance.
    Gold {
        /// Signed change in gold.
        delta: i64,
    },
    /// Give the agent items.
    AddItem {
        /// Item name as proposed; normalized on application.
        item: String,
        /// How many.
        quantity: u32,
    },
    /// Take items from the agent.
    RemoveItem {
        /// Item name as proposed; normalized on application.
        item: String,
        /// How many.
        quantity: u32,
    },
    /// Shift the agent's feeling toward another agent.
    Relationship {
        /// Whose relationship entry changes.
        toward: AgentId,
        /// Signed change in feeling score.
        delta: Decimal,
    },
}

/// Why an effect failed its structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// A condition or item name was empty after trimming.
    EmptyLabel,
    /// A condition or item name exceeded [`MAX_LABEL_LEN`].
    LabelTooLong,
    /// A numeric delta or quantity was zero.
    ZeroAmount,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyLabel => f.write_str("empty label"),
            Self::LabelTooLong => write!(f, "label longer than {MAX_LABEL_LEN} characters"),
            Self::ZeroAmount => f.write_str("zero amount"),
        }
    }
}

impl Effect {
    /// Short tag used in logs.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::AddCondition { .. } => "add_condition",
            Self::RemoveCondition { .. } => "remove_condition",
            Self::Health { .. } => "health",
            Self::Gold { .. } => "gold",
            Self::AddItem { .. } => "add_item",
            Self::RemoveItem { .. } => "remove_item",
            Self::Relationship { .. } => "relationship",
        }
    }

    /// Structural validation that needs no agent state.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] for blank or oversized labels and for
    /// deltas or quantities of zero.
    pub fn check_shape(&self) -> Result<(), ShapeError> {
        match self {
            Self::AddCondition { condition } | Self::RemoveCondition { condition } => {
                check_label(condition)
            }
            Self::AddItem { item, quantity } | Self::RemoveItem { item, quantity } => {
                check_label(item)?;
                if *quantity == 0 {
                    return Err(ShapeError::ZeroAmount);
                }
                Ok(())
            }
            Self::Health { delta } => nonzero(*delta == 0),
            Self::Gold { delta } => nonzero(*delta == 0),
            Self::Relationship { delta, .. } => nonzero(delta.is_zero()),
        }
    }
}

fn check_label(label: &str) -> Result<(), ShapeError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(ShapeError::EmptyLabel);
    }
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(ShapeError::LabelTooLong);
    }
    Ok(())
}

const fn nonzero(is_zero: bool) -> Result<(), ShapeError> {
    if is_zero {
        Err(ShapeError::ZeroAmount)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn blank_condition_is_rejected() {
        let effect = Effect::AddCondition {
            condition: "   ".to_owned(),
        };
        assert_eq!(effect.check_shape(), Err(ShapeError::EmptyLabel));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let effect = Effect::RemoveItem {
            item: "bread".to_owned(),
            quantity: 0,
        };
        assert_eq!(effect.check_shape(), Err(ShapeError::ZeroAmount));
    }

    #[test]
    fn well_formed_effects_pass() {
        let effects = [
            Effect::AddCondition {
                condition: "broken leg".to_owned(),
            },
            Effect::Gold { delta: -5 },
            Effect::Relationship {
                toward: AgentId::new(),
                delta: dec!(-0.2),
            },
        ];
        assert!(effects.iter().all(|e| e.check_shape().is_ok()));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Effect::Health { delta: -10 }).unwrap();
        assert_eq!(json.get("kind").and_then(|v| v.as_str()), Some("health"));
        assert_eq!(json.get("delta").and_then(serde_json::Value::as_i64), Some(-10));
    }
}
