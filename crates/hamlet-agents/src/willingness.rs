//! Whether an agent agrees to start a conversation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::agent::Agent;

/// Weight of the existing feeling score in the willingness chance.
const FEELING_WEIGHT: Decimal = Decimal::from_parts(3, 0, 0, false, 1);

/// Floor on the willingness chance; even a hostile agent sometimes talks.
const MIN_CHANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Resolution of the random roll.
const ROLL_SCALE: u32 = 1_000;

/// Decides whether `agent` is willing to talk to `other` right now.
pub trait WillingnessCheck: Send {
    /// Return `true` if `agent` agrees to talk with `other`.
    fn is_willing(&mut self, agent: &Agent, other: &Agent) -> bool;
}

impl<F> WillingnessCheck for F
where
    F: FnMut(&Agent, &Agent) -> bool + Send,
{
    fn is_willing(&mut self, agent: &Agent, other: &Agent) -> bool {
        self(agent, other)
    }
}

/// Probability in `[0.1, 1]` that `agent` agrees to talk to `other`:
/// friendliness plus a share of the current feeling.
pub fn willingness_chance(agent: &Agent, other: &Agent) -> Decimal {
    let feeling = agent.feeling_toward(other.id);
    agent
        .personality
        .friendliness
        .saturating_add(feeling.saturating_mul(FEELING_WEIGHT))
        .clamp(MIN_CHANCE, Decimal::ONE)
}

/// Rolls [`willingness_chance`] against a random number.
#[derive(Debug)]
pub struct ChanceWillingness {
    rng: StdRng,
}

impl ChanceWillingness {
    /// Seed from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Seed deterministically.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for ChanceWillingness {
    fn default() -> Self {
        Self::new()
    }
}

impl WillingnessCheck for ChanceWillingness {
    fn is_willing(&mut self, agent: &Agent, other: &Agent) -> bool {
        let threshold = willingness_chance(agent, other)
            .saturating_mul(Decimal::from(ROLL_SCALE))
            .to_u32()
            .unwrap_or(ROLL_SCALE);
        self.rng.random_range(0..ROLL_SCALE) < threshold
    }
}
