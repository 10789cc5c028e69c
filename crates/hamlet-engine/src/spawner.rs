//! Villager spawner for seeding the village with its first residents.
//!
//! At startup the spawner creates N villagers with distinct names, a trade
//! each (which fixes their starting goods and manner of speech), a random
//! personality, and a random tile on the village grid.

use hamlet_agents::agent::DEFAULT_GOLD;
use hamlet_agents::character::DEFAULT_BASE_MOVE_SPEED;
use hamlet_agents::{Agent, World};
use hamlet_types::Personality;
use rand::Rng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::EngineError;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Configuration for the villager spawner, the `villagers` section of
/// `hamlet-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnerConfig {
    /// Number of villagers to create at startup.
    #[serde(default = "default_seed_count")]
    pub seed_count: u32,

    /// Gold every villager starts with.
    #[serde(default = "default_starting_gold")]
    pub starting_gold: u32,

    /// Movement speed with no health conditions, in tiles per tick.
    #[serde(default = "default_base_move_speed")]
    pub base_move_speed: Decimal,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            seed_count: default_seed_count(),
            starting_gold: default_starting_gold(),
            base_move_speed: default_base_move_speed(),
        }
    }
}

const fn default_seed_count() -> u32 {
    6
}

const fn default_starting_gold() -> u32 {
    DEFAULT_GOLD
}

const fn default_base_move_speed() -> Decimal {
    DEFAULT_BASE_MOVE_SPEED
}

// -----------------------------------------------------------------------
// Name and trade pools
// -----------------------------------------------------------------------

/// Built-in pool of villager names, drawn without replacement.
const NAME_POOL: &[&str] = &[
    "Mara", "Bram", "Odile", "Tobin", "Wren", "Hale", "Isolde", "Corin",
    "Ansel", "Petra", "Gideon", "Maud", "Edric", "Rowena", "Silas", "Tamsin",
    "Ulric", "Verity", "Aldous", "Bryony", "Cuthbert", "Delphine", "Ewan",
    "Fenna",
];

/// A village trade: what the villager does, what they carry, how they talk.
struct Trade {
    role: &'static str,
    goods: &'static [(&'static str, u32)],
    speech_style: &'static str,
}

const TRADES: &[Trade] = &[
    Trade {
        role: "baker",
        goods: &[("bread", 3)],
        speech_style: "warm and chatty",
    },
    Trade {
        role: "blacksmith",
        goods: &[("hammer", 1), ("nails", 10)],
        speech_style: "gruff, few words",
    },
    Trade {
        role: "herbalist",
        goods: &[("healing salve", 2), ("dried sage", 4)],
        speech_style: "soft-spoken and careful",
    },
    Trade {
        role: "farmer",
        goods: &[("turnips", 6)],
        speech_style: "plain and practical",
    },
    Trade {
        role: "innkeeper",
        goods: &[("ale", 4)],
        speech_style: "loud and welcoming",
    },
    Trade {
        role: "weaver",
        goods: &[("wool cloth", 2)],
        speech_style: "precise, a little proud",
    },
    Trade {
        role: "hunter",
        goods: &[("knife", 1), ("rabbit pelt", 2)],
        speech_style: "quiet and watchful",
    },
];

// -----------------------------------------------------------------------
// Seed spawn
// -----------------------------------------------------------------------

/// Spawn the seed villagers into a fresh [`World`].
///
/// Trades are dealt round-robin; names and tiles are random. Positions lie
/// in `0..grid_size` on both axes.
///
/// # Errors
///
/// Returns [`EngineError::Spawner`] if the name pool is too small for the
/// requested count or the grid has no tiles.
pub fn spawn_villagers(
    config: &SpawnerConfig,
    grid_size: u16,
    rng: &mut impl Rng,
) -> Result<World, EngineError> {
    if grid_size == 0 {
        return Err(EngineError::Spawner {
            message: String::from("village grid has no tiles to place villagers on"),
        });
    }
    let names = pick_unique_names(rng, config.seed_count)?;
    let mut world = World::new();

    for (i, name) in names.into_iter().enumerate() {
        let trade = TRADES
            .get(i.checked_rem(TRADES.len()).unwrap_or(0))
            .ok_or_else(|| EngineError::Spawner {
                message: format!("no trade for villager {i}"),
            })?;
        let x = i32::from(rng.random_range(0..grid_size));
        let y = i32::from(rng.random_range(0..grid_size));

        let mut agent = Agent::new(name, trade.role, random_personality(rng))
            .with_gold(config.starting_gold)
            .with_speech_style(trade.speech_style)
            .with_base_move_speed(config.base_move_speed)
            .with_position(x, y);
        for (item, quantity) in trade.goods {
            agent = agent.with_item(item, *quantity);
        }

        info!(
            agent_id = %agent.id,
            name = %agent.name,
            role = %agent.role,
            x,
            y,
            "Spawned villager"
        );
        world.insert(agent)?;
    }

    Ok(world)
}

/// Draw `count` distinct names from [`NAME_POOL`].
fn pick_unique_names(rng: &mut impl Rng, count: u32) -> Result<Vec<String>, EngineError> {
    let wanted = usize::try_from(count)
        .ok()
        .filter(|&n| n <= NAME_POOL.len())
        .ok_or_else(|| EngineError::Spawner {
            message: format!(
                "cannot name {count} villagers from a pool of {}",
                NAME_POOL.len()
            ),
        })?;
    Ok(NAME_POOL
        .choose_multiple(rng, wanted)
        .map(|name| (*name).to_owned())
        .collect())
}

/// One personality trait, in hundredths over `[0, 1]`.
fn trait_value(rng: &mut impl Rng) -> Decimal {
    Decimal::new(rng.random_range(0_i64..=100), 2)
}

/// Random [`Personality`] with every trait in `[0, 1]`.
fn random_personality(rng: &mut impl Rng) -> Personality {
    Personality::new(
        trait_value(rng),
        trait_value(rng),
        trait_value(rng),
        trait_value(rng),
        trait_value(rng),
        trait_value(rng),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn spawns_requested_count_with_unique_names() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = SpawnerConfig {
            seed_count: 10,
            ..SpawnerConfig::default()
        };
        let world = spawn_villagers(&config, 16, &mut rng).unwrap();
        assert_eq!(world.len(), 10);
        let names: BTreeSet<&str> = world.agents().map(|a| a.name.as_str()).collect();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn villagers_land_on_the_grid_with_their_goods() {
        let mut rng = StdRng::seed_from_u64(11);
        let world = spawn_villagers(&SpawnerConfig::default(), 5, &mut rng).unwrap();
        assert_eq!(world.len(), 6);
        for agent in world.agents() {
            let (x, y) = agent.position.unwrap();
            assert!((0..5).contains(&x) && (0..5).contains(&y), "{} at {x},{y}", agent.name);
            assert_eq!(agent.gold, DEFAULT_GOLD);
            assert!(!agent.inventory.is_empty(), "{} carries nothing", agent.name);
        }
        let bakers = world.agents().filter(|a| a.role == "baker").count();
        assert_eq!(bakers, 1);
    }

    #[test]
    fn base_speed_comes_from_config() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SpawnerConfig {
            seed_count: 2,
            base_move_speed: Decimal::ONE,
            ..SpawnerConfig::default()
        };
        let world = spawn_villagers(&config, 8, &mut rng).unwrap();
        assert!(world.agents().all(|a| a.state.effective_move_speed() == Decimal::ONE));
    }

    #[test]
    fn too_many_villagers_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = SpawnerConfig {
            seed_count: 1_000,
            ..SpawnerConfig::default()
        };
        assert!(matches!(
            spawn_villagers(&config, 8, &mut rng),
            Err(EngineError::Spawner { .. })
        ));
    }

    #[test]
    fn empty_grid_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(spawn_villagers(&SpawnerConfig::default(), 0, &mut rng).is_err());
    }

    #[test]
    fn personalities_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let p = random_personality(&mut rng);
            for value in [p.friendliness, p.honesty, p.greed, p.bravery, p.curiosity, p.patience] {
                assert!((Decimal::ZERO..=Decimal::ONE).contains(&value));
            }
        }
    }
}
