//! Wandering and proximity on the village grid.
//!
//! A deliberately small stand-in for real pathfinding: idle villagers take
//! a random step each tick, no longer than their effective move speed, and
//! any two idle villagers within the talk radius become a candidate pair.

use hamlet_agents::{Agent, World};
use hamlet_types::AgentId;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;

/// Whole tiles `agent` may cover this tick.
///
/// Fractional speed is rounded down; a villager too hurt to walk stays put.
pub fn step_length(agent: &Agent) -> i32 {
    agent
        .state
        .effective_move_speed()
        .floor()
        .to_i32()
        .unwrap_or(0)
        .max(0)
}

/// Move every idle villager one random step. Returns how many moved.
///
/// Busy villagers (in a conversation) hold still. Positions are clamped to
/// `0..grid_size` on both axes.
pub fn wander(
    world: &mut World,
    grid_size: u16,
    is_busy: impl Fn(AgentId) -> bool,
    rng: &mut impl Rng,
) -> usize {
    let max = i32::from(grid_size).saturating_sub(1).max(0);
    let mut moved = 0_usize;
    for agent in world.agents_mut() {
        if is_busy(agent.id) {
            continue;
        }
        let Some((x, y)) = agent.position else {
            continue;
        };
        let step = step_length(agent);
        if step == 0 {
            continue;
        }
        let dx = rng.random_range(step.saturating_neg()..=step);
        let dy = rng.random_range(step.saturating_neg()..=step);
        let next = (
            x.saturating_add(dx).clamp(0, max),
            y.saturating_add(dy).clamp(0, max),
        );
        if next != (x, y) {
            agent.position = Some(next);
            moved = moved.saturating_add(1);
        }
    }
    moved
}

/// Chebyshev distance between two tiles.
pub fn distance(a: (i32, i32), b: (i32, i32)) -> u32 {
    a.0.abs_diff(b.0).max(a.1.abs_diff(b.1))
}

/// Pairs of idle villagers standing within `radius` tiles of each other.
///
/// Each villager appears in at most one pair. Villagers are matched in ID
/// order, closest partner first.
pub fn nearby_pairs(
    world: &World,
    radius: u16,
    is_busy: impl Fn(AgentId) -> bool,
) -> Vec<(AgentId, AgentId)> {
    let idle: Vec<(AgentId, (i32, i32))> = world
        .agents()
        .filter(|a| !is_busy(a.id))
        .filter_map(|a| a.position.map(|p| (a.id, p)))
        .collect();

    let mut taken: Vec<AgentId> = Vec::new();
    let mut pairs = Vec::new();
    for (i, (id, pos)) in idle.iter().enumerate() {
        if taken.contains(id) {
            continue;
        }
        let partner = idle
            .iter()
            .skip(i.saturating_add(1))
            .filter(|(other, _)| !taken.contains(other))
            .map(|(other, other_pos)| (distance(*pos, *other_pos), *other))
            .filter(|(d, _)| *d <= u32::from(radius))
            .min_by_key(|(d, _)| *d);
        if let Some((_, other)) = partner {
            taken.push(*id);
            taken.push(other);
            pairs.push((*id, other));
        }
    }
    pairs
}
