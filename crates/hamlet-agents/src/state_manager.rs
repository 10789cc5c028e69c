//! Validation and atomic application of effect batches.
//!
//! Two phases, both on the thread that owns the [`World`]:
//!
//! 1. [`validate`] checks a proposed batch against the agent's live state.
//!    Numeric deltas are clamped into legal ranges, individually bad effects
//!    are dropped with a reason, and a removal of an item the agent does not
//!    have fails the whole batch.
//! 2. [`apply`] writes a validated batch in one `&mut` step and recomputes
//!    movement speed. Nothing else can observe the agent between effects.

use std::collections::BTreeSet;

use hamlet_types::{AgentId, Effect, SimTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::error::AgentError;
use crate::inventory::display_item;
use crate::world::World;

/// Largest relationship shift a single action may cause.
pub const MAX_RELATIONSHIP_DELTA: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A batch that passed validation, plus what was dropped along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedBatch {
    /// Effects safe to apply, in proposal order, with deltas already clamped.
    pub effects: Vec<Effect>,
    /// Effects that were rejected individually.
    pub dropped: Vec<AgentError>,
}

/// Check a proposed batch against `agent`'s current state.
///
/// Effects are considered in order, each one seeing the state left by the
/// ones before it, so two removals of the same single item fail.
///
/// # Errors
///
/// Returns [`AgentError::MissingItem`] when any removal asks for more than
/// the agent holds. Callers treat that as a failed action.
pub fn validate(agent: &Agent, proposed: &[Effect]) -> Result<ValidatedBatch, AgentError> {
    let mut batch = ValidatedBatch::default();
    let mut inventory = agent.inventory.clone();
    let mut gold = i64::from(agent.gold);
    let mut health = i64::from(agent.state.health);
    let max_health = i64::from(agent.state.max_health);
    let mut conditions: BTreeSet<String> = agent
        .state
        .health_conditions
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    for effect in proposed {
        if let Err(shape) = effect.check_shape() {
            batch.dropped.push(AgentError::from_shape(effect.tag(), &shape));
            continue;
        }
        let accepted = match effect {
            Effect::AddCondition { condition } => {
                let key = condition.trim().to_lowercase();
                if conditions.insert(key) {
                    Ok(Effect::AddCondition {
                        condition: condition.trim().to_owned(),
                    })
                } else {
                    Err(invalid(effect, format!("already has '{}'", condition.trim())))
                }
            }
            Effect::RemoveCondition { condition } => {
                if conditions.remove(&condition.trim().to_lowercase()) {
                    Ok(Effect::RemoveCondition {
                        condition: condition.trim().to_owned(),
                    })
                } else {
                    Err(invalid(effect, format!("does not have '{}'", condition.trim())))
                }
            }
            Effect::Health { delta } => {
                let target = health.saturating_add(i64::from(*delta)).clamp(0, max_health);
                let clamped = target.saturating_sub(health);
                health = target;
                i32::try_from(clamped)
                    .ok()
                    .filter(|d| *d != 0)
                    .map(|delta| Effect::Health { delta })
                    .ok_or_else(|| invalid(effect, "no room to change health".to_owned()))
            }
            Effect::Gold { delta } => {
                let target = gold
                    .saturating_add(*delta)
                    .clamp(0, i64::from(u32::MAX));
                let clamped = target.saturating_sub(gold);
                gold = target;
                if clamped == 0 {
                    Err(invalid(effect, "balance cannot move that way".to_owned()))
                } else {
                    Ok(Effect::Gold { delta: clamped })
                }
            }
            Effect::AddItem { item, quantity } => inventory
                .add(item, *quantity)
                .map(|_| effect.clone())
                .map_err(|e| invalid(effect, e.to_string())),
            Effect::RemoveItem { item, quantity } => {
                inventory.remove(item, *quantity)?;
                Ok(effect.clone())
            }
            Effect::Relationship { toward, delta } => {
                if *toward == agent.id {
                    Err(invalid(effect, "relationship with self".to_owned()))
                } else {
                    Ok(Effect::Relationship {
                        toward: *toward,
                        delta: (*delta).clamp(-MAX_RELATIONSHIP_DELTA, MAX_RELATIONSHIP_DELTA),
                    })
                }
            }
        };
        match accepted {
            Ok(effect) => batch.effects.push(effect),
            Err(err) => {
                debug!(agent_id = %agent.id, error = %err, "dropping effect");
                batch.dropped.push(err);
            }
        }
    }
    Ok(batch)
}

fn invalid(effect: &Effect, reason: String) -> AgentError {
    AgentError::InvalidEffect {
        tag: effect.tag(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// What an applied batch changed, for announcements and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSummary {
    /// The agent the batch was applied to.
    pub agent_id: AgentId,
    /// Display name at the time of application.
    pub agent_name: String,
    /// One short phrase per change, in application order.
    pub changes: Vec<String>,
    /// Movement speed before the batch.
    pub move_speed_before: Decimal,
    /// Movement speed after the batch.
    pub move_speed_after: Decimal,
}

impl AppliedSummary {
    /// Whether the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Single-line description, e.g. `"Bram: now has broken leg; slowed to 1.0"`.
    pub fn describe(&self) -> Option<String> {
        if self.changes.is_empty() {
            return None;
        }
        let mut text = format!("{}: {}", self.agent_name, self.changes.join("; "));
        if self.move_speed_after < self.move_speed_before {
            text.push_str(&format!("; slowed to {}", self.move_speed_after.normalize()));
        } else if self.move_speed_after > self.move_speed_before {
            text.push_str(&format!("; speed back to {}", self.move_speed_after.normalize()));
        }
        Some(text)
    }
}

/// Apply a validated batch to one agent.
///
/// Arithmetic saturates, so a batch that was validated against this same
/// state cannot fail. Movement speed is recomputed once at the end.
pub fn apply(agent: &mut Agent, effects: &[Effect], now: SimTime) -> AppliedSummary {
    let move_speed_before = agent.state.effective_move_speed();
    let mut changes = Vec::with_capacity(effects.len());

    for effect in effects {
        match effect {
            Effect::AddCondition { condition } => {
                agent.state.health_conditions.push(condition.clone());
                changes.push(format!("now has {condition}"));
            }
            Effect::RemoveCondition { condition } => {
                let before = agent.state.health_conditions.len();
                let wanted = condition.to_lowercase();
                agent
                    .state
                    .health_conditions
                    .retain(|c| c.to_lowercase() != wanted);
                if agent.state.health_conditions.len() < before {
                    changes.push(format!("no longer has {condition}"));
                }
            }
            Effect::Health { delta } => {
                let before = agent.state.health;
                agent.state.health = before
                    .saturating_add_signed(*delta)
                    .min(agent.state.max_health);
                if agent.state.health != before {
                    changes.push(format!("health {before} -> {}", agent.state.health));
                }
            }
            Effect::Gold { delta } => {
                let before = agent.gold;
                let target = i64::from(before).saturating_add(*delta);
                agent.gold = u32::try_from(target.max(0)).unwrap_or(u32::MAX);
                if agent.gold > before {
                    changes.push(format!("gained {} gold", agent.gold.saturating_sub(before)));
                } else if agent.gold < before {
                    changes.push(format!("lost {} gold", before.saturating_sub(agent.gold)));
                }
            }
            Effect::AddItem { item, quantity } => match agent.inventory.add(item, *quantity) {
                Ok(_) => changes.push(format!("received {}", quantity_phrase(item, *quantity))),
                Err(err) => warn!(agent_id = %agent.id, error = %err, "item add skipped"),
            },
            Effect::RemoveItem { item, quantity } => match agent.inventory.remove(item, *quantity) {
                Ok(_) => changes.push(format!("gave up {}", quantity_phrase(item, *quantity))),
                Err(err) => warn!(agent_id = %agent.id, error = %err, "item removal skipped"),
            },
            Effect::Relationship { toward, delta } => {
                let before = agent.feeling_toward(*toward);
                let after = agent.relationship_mut(*toward).adjust_feeling(*delta, now);
                if after != before {
                    let direction = if after > before { "warmer" } else { "cooler" };
                    changes.push(format!("feels {direction} toward them"));
                }
            }
        }
    }

    let move_speed_after = agent.state.recompute_move_speed();
    AppliedSummary {
        agent_id: agent.id,
        agent_name: agent.name.clone(),
        changes,
        move_speed_before,
        move_speed_after,
    }
}

/// Apply both sides of a resolved action in one main-thread step.
///
/// Both agents are looked up before anything is written, so a missing
/// agent leaves the world untouched.
pub fn apply_outcome(
    world: &mut World,
    actor: AgentId,
    actor_effects: &[Effect],
    target: AgentId,
    target_effects: &[Effect],
    now: SimTime,
) -> Result<(AppliedSummary, AppliedSummary), AgentError> {
    if !world.contains(actor) {
        return Err(AgentError::AgentNotFound(actor));
    }
    if !world.contains(target) {
        return Err(AgentError::AgentNotFound(target));
    }
    let actor_summary = apply(world.agent_mut(actor)?, actor_effects, now);
    let target_summary = apply(world.agent_mut(target)?, target_effects, now);
    Ok((actor_summary, target_summary))
}

fn quantity_phrase(item: &str, quantity: u32) -> String {
    let name = display_item(&crate::inventory::normalize_item(item));
    if quantity == 1 {
        name
    } else {
        format!("{quantity} {name}")
    }
}
