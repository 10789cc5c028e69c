//! The process-wide world context: agent table and conversation cooldowns.
//!
//! There is exactly one [`World`] per simulation. It is created at startup,
//! passed by reference to whatever needs it, and dropped at shutdown. All
//! writes happen on the thread that owns it.

use std::collections::BTreeMap;

use hamlet_types::{AgentId, SimTime};
use rust_decimal::Decimal;
use tracing::debug;

use crate::agent::Agent;
use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Cooldowns
// ---------------------------------------------------------------------------

/// Unordered pair of agents. `PairKey::new(a, b) == PairKey::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey(AgentId, AgentId);

impl PairKey {
    /// Build the key for a pair in either order.
    pub fn new(a: AgentId, b: AgentId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    /// The two agents, lower ID first.
    pub const fn agents(self) -> (AgentId, AgentId) {
        (self.0, self.1)
    }
}

/// Per-pair earliest time a new conversation may start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownMap {
    entries: BTreeMap<PairKey, SimTime>,
}

impl CooldownMap {
    /// Create an empty map.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Block the pair until `expiry`. A later expiry replaces an earlier one.
    pub fn insert(&mut self, a: AgentId, b: AgentId, expiry: SimTime) {
        let slot = self.entries.entry(PairKey::new(a, b)).or_insert(expiry);
        *slot = (*slot).max(expiry);
    }

    /// The expiry if the pair is still cooling down at `now`.
    pub fn blocked_until(&self, a: AgentId, b: AgentId, now: SimTime) -> Option<SimTime> {
        self.entries
            .get(&PairKey::new(a, b))
            .copied()
            .filter(|expiry| now < *expiry)
    }

    /// Forget entries that have expired by `now`. Returns how many were removed.
    pub fn purge_expired(&mut self, now: SimTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| now < *expiry);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Agent table plus cooldowns.
#[derive(Debug, Clone, Default)]
pub struct World {
    agents: BTreeMap<AgentId, Agent>,
    /// Conversation cooldowns, written when a session closes.
    pub cooldowns: CooldownMap,
}

impl World {
    /// Create an empty world.
    pub const fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            cooldowns: CooldownMap::new(),
        }
    }

    /// Add an agent. Returns its ID.
    pub fn insert(&mut self, agent: Agent) -> Result<AgentId, AgentError> {
        let id = agent.id;
        if self.agents.contains_key(&id) {
            return Err(AgentError::DuplicateAgent(id));
        }
        self.agents.insert(id, agent);
        Ok(id)
    }

    /// Look up an agent.
    pub fn agent(&self, id: AgentId) -> Result<&Agent, AgentError> {
        self.agents.get(&id).ok_or(AgentError::AgentNotFound(id))
    }

    /// Look up an agent for mutation.
    pub fn agent_mut(&mut self, id: AgentId) -> Result<&mut Agent, AgentError> {
        self.agents.get_mut(&id).ok_or(AgentError::AgentNotFound(id))
    }

    /// Whether the agent exists.
    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// All agents in ID order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Mutable iteration over all agents in ID order.
    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.values_mut()
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the world has no agents.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Apply time-based relationship decay to every agent.
    pub fn decay_relationships(&mut self, now: SimTime, per_hour: Decimal) {
        for agent in self.agents.values_mut() {
            let agent_id = agent.id;
            for (other, rel) in agent.relationships_mut() {
                let before = rel.feeling_score();
                let after = rel.decay(now, per_hour);
                if before != after {
                    debug!(%agent_id, other = %other, %before, %after, "relationship decayed");
                }
            }
        }
    }

    /// Let every agent recover health for `elapsed_secs` of simulated time.
    ///
    /// Returns how many agents gained health.
    pub fn regenerate_health(&mut self, elapsed_secs: u64, per_hour: u32) -> usize {
        let amount = u64::from(per_hour)
            .saturating_mul(elapsed_secs)
            .checked_div(3600)
            .map_or(0, |a| u32::try_from(a).unwrap_or(u32::MAX));
        if amount == 0 {
            return 0;
        }
        let mut healed = 0_usize;
        for agent in self.agents.values_mut() {
            let gained = agent.state.regenerate(amount);
            if gained > 0 {
                debug!(agent_id = %agent.id, gained, health = agent.state.health, "health regenerated");
                healed = healed.saturating_add(1);
            }
        }
        healed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hamlet_types::Personality;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::relationship::{DEFAULT_DECAY_PER_HOUR, Relationship};

    #[test]
    fn pair_key_is_unordered() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
    }

    #[test]
    fn cooldown_blocks_until_expiry() {
        let a = AgentId::new();
        let b = AgentId::new();
        let mut map = CooldownMap::new();
        map.insert(a, b, SimTime::from_secs(100));
        assert_eq!(map.blocked_until(b, a, SimTime::from_secs(99)), Some(SimTime::from_secs(100)));
        assert_eq!(map.blocked_until(a, b, SimTime::from_secs(100)), None);
        assert_eq!(map.purge_expired(SimTime::from_secs(100)), 1);
        assert!(map.is_empty());
    }

    #[test]
    fn later_expiry_wins() {
        let a = AgentId::new();
        let b = AgentId::new();
        let mut map = CooldownMap::new();
        map.insert(a, b, SimTime::from_secs(500));
        map.insert(b, a, SimTime::from_secs(200));
        assert_eq!(map.blocked_until(a, b, SimTime::from_secs(300)), Some(SimTime::from_secs(500)));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut world = World::new();
        let agent = Agent::new("Ola", "farmer", Personality::default());
        let copy = agent.clone();
        assert!(world.insert(agent).is_ok());
        assert!(matches!(world.insert(copy), Err(AgentError::DuplicateAgent(_))));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn decay_reaches_every_relationship() {
        let friend = AgentId::new();
        let rival = AgentId::new();
        let agent = Agent::new("Ola", "farmer", Personality::default())
            .with_relationship(friend, Relationship::with_feeling(dec!(0.5)))
            .with_relationship(rival, Relationship::with_feeling(dec!(-0.5)));
        let mut world = World::new();
        let id = world.insert(agent).unwrap();

        world.decay_relationships(SimTime::from_hours(10), DEFAULT_DECAY_PER_HOUR);

        let agent = world.agent(id).unwrap();
        assert_eq!(agent.feeling_toward(friend), dec!(0.49));
        assert_eq!(agent.feeling_toward(rival), dec!(-0.49));
    }

    #[test]
    fn half_an_hour_heals_half_the_hourly_rate() {
        let mut hurt = Agent::new("Ola", "farmer", Personality::default());
        hurt.state.health = 50;
        let healthy = Agent::new("Bram", "smith", Personality::default());
        let mut world = World::new();
        let hurt_id = world.insert(hurt).unwrap();
        world.insert(healthy).unwrap();

        assert_eq!(world.regenerate_health(1800, 6), 1);
        assert_eq!(world.agent(hurt_id).unwrap().state.health, 53);

        // Too short to earn a whole point.
        assert_eq!(world.regenerate_health(60, 6), 0);
        assert_eq!(world.agent(hurt_id).unwrap().state.health, 53);
    }
}
