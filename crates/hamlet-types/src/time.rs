//! Simulated time.
//!
//! The host loop advances a [`SimTime`] every tick. Cooldowns, relationship
//! decay and "last interaction" stamps are all expressed in simulated
//! seconds so they stay independent of how fast the loop actually runs.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Seconds in one simulated minute.
const SECS_PER_MINUTE: u64 = 60;

/// Seconds in one simulated hour.
const SECS_PER_HOUR: u64 = 3_600;

/// Seconds in one simulated day.
const SECS_PER_DAY: u64 = 86_400;

/// A point on the simulated clock, in whole seconds since the simulation began.
///
/// All arithmetic saturates; the clock never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of the simulation.
    pub const ZERO: Self = Self(0);

    /// Construct from a raw number of simulated seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Construct from simulated minutes.
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(minutes.saturating_mul(SECS_PER_MINUTE))
    }

    /// Construct from simulated hours.
    pub const fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(SECS_PER_HOUR))
    }

    /// Raw simulated seconds.
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// This instant advanced by `secs` simulated seconds.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub const fn secs_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whole simulated hours elapsed from `earlier` to `self`.
    pub const fn hours_since(self, earlier: Self) -> u64 {
        self.secs_since(earlier) / SECS_PER_HOUR
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let day = self.0 / SECS_PER_DAY;
        let hour = (self.0 % SECS_PER_DAY) / SECS_PER_HOUR;
        let minute = (self.0 % SECS_PER_HOUR) / SECS_PER_MINUTE;
        write!(f, "day {day} {hour:02}:{minute:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates() {
        let late = SimTime::from_secs(u64::MAX);
        assert_eq!(late.plus_secs(10), late);
        assert_eq!(SimTime::ZERO.secs_since(late), 0);
    }

    #[test]
    fn hours_since_truncates() {
        let start = SimTime::from_minutes(30);
        let later = start.plus_secs(3 * 3_600 + 59);
        assert_eq!(later.hours_since(start), 3);
    }

    #[test]
    fn display_shows_day_and_clock() {
        let t = SimTime::from_hours(26).plus_secs(5 * 60);
        assert_eq!(t.to_string(), "day 1 02:05");
    }
}
