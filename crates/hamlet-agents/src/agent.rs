//! The agent record owned by the [`World`](crate::world::World).

use std::collections::BTreeMap;

use hamlet_types::{AgentId, Personality};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::character::{CharacterState, DEFAULT_BASE_MOVE_SPEED};
use crate::inventory::Inventory;
use crate::relationship::Relationship;

/// Gold every agent starts with unless told otherwise.
pub const DEFAULT_GOLD: u32 = 50;

/// A villager.
///
/// Agents are plain data. They are only ever mutated on the thread that
/// owns the world; the dialogue workers see snapshots, never references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Occupation or place in the village, e.g. "blacksmith".
    pub role: String,
    /// How this agent talks, passed through to the dialogue prompt.
    pub speech_style: String,
    /// Fixed personality vector.
    pub personality: Personality,
    /// Health, conditions and movement speed.
    pub state: CharacterState,
    /// Gold balance. Never negative by construction.
    pub gold: u32,
    /// Carried items.
    pub inventory: Inventory,
    /// Grid position, used to anchor announcements.
    pub position: Option<(i32, i32)>,
    relationships: BTreeMap<AgentId, Relationship>,
}

impl Agent {
    /// Create an agent with default health, gold and speed.
    pub fn new(name: impl Into<String>, role: impl Into<String>, personality: Personality) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            role: role.into(),
            speech_style: "plain and direct".to_owned(),
            personality,
            state: CharacterState::new(DEFAULT_BASE_MOVE_SPEED),
            gold: DEFAULT_GOLD,
            inventory: Inventory::new(),
            position: None,
            relationships: BTreeMap::new(),
        }
    }

    /// Set the gold balance.
    #[must_use]
    pub const fn with_gold(mut self, gold: u32) -> Self {
        self.gold = gold;
        self
    }

    /// Set the speech style.
    #[must_use]
    pub fn with_speech_style(mut self, style: impl Into<String>) -> Self {
        self.speech_style = style.into();
        self
    }

    /// Set the grid position.
    #[must_use]
    pub const fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }

    /// Set the base movement speed.
    #[must_use]
    pub fn with_base_move_speed(mut self, speed: Decimal) -> Self {
        self.state.base_move_speed = speed;
        self.state.recompute_move_speed();
        self
    }

    /// Give the agent items at creation time. Overflow is ignored.
    #[must_use]
    pub fn with_item(mut self, item: &str, quantity: u32) -> Self {
        let _ = self.inventory.add(item, quantity);
        self
    }

    /// Seed a relationship, e.g. from a starting scenario.
    #[must_use]
    pub fn with_relationship(mut self, other: AgentId, relationship: Relationship) -> Self {
        self.relationships.insert(other, relationship);
        self
    }

    /// This agent's relationship with `other`, if they have met.
    pub fn relationship(&self, other: AgentId) -> Option<&Relationship> {
        self.relationships.get(&other)
    }

    /// Feeling toward `other`, neutral if they have never met.
    pub fn feeling_toward(&self, other: AgentId) -> Decimal {
        self.relationships
            .get(&other)
            .map_or(Decimal::ZERO, Relationship::feeling_score)
    }

    /// Mutable relationship with `other`, created neutral on first contact.
    pub fn relationship_mut(&mut self, other: AgentId) -> &mut Relationship {
        self.relationships.entry(other).or_default()
    }

    /// All relationships, keyed by the other agent.
    pub fn relationships(&self) -> impl Iterator<Item = (&AgentId, &Relationship)> {
        self.relationships.iter()
    }

    /// Mutable iteration over all relationships.
    pub fn relationships_mut(&mut self) -> impl Iterator<Item = (&AgentId, &mut Relationship)> {
        self.relationships.iter_mut()
    }
}
