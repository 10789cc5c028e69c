//! The village tick loop.
//!
//! Each tick, in order:
//!
//! 1. Advance the simulated clock
//! 2. Let idle villagers wander
//! 3. Offer every nearby idle pair a conversation
//! 4. Poll the dialogue manager exactly once
//! 5. Publish any announcements
//! 6. Periodically decay relationships, purge expired cooldowns and
//!    regenerate health
//!
//! The loop ends on the tick limit or when the stop flag is raised, and
//! always shuts the dialogue manager down on the way out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hamlet_agents::World;
use hamlet_dialogue::{DialogueManager, InitiateRejection};
use hamlet_types::{Announcement, Placement, SimTime};
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::VillageSettings;
use crate::village;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `max_ticks` ticks have run.
    TickLimit,
    /// The stop flag was raised (ctrl-c).
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Simulated time at the end of the tick.
    pub now: SimTime,
    /// Villagers that changed tile.
    pub moved: usize,
    /// Conversations started this tick.
    pub started: usize,
    /// Conversations that closed this tick.
    pub closed: usize,
    /// Announcements published this tick.
    pub announcements: Vec<Announcement>,
}

/// Final tally of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub end_reason: EndReason,
    /// Ticks executed.
    pub total_ticks: u64,
    /// Simulated time when the loop stopped.
    pub ended_at: SimTime,
    /// Conversations started over the whole run.
    pub conversations_started: u64,
    /// Conversations that reached Closed over the whole run.
    pub conversations_closed: u64,
    /// Requests cancelled by the final shutdown.
    pub cancelled_requests: usize,
}

/// The world, the dialogue manager and the loop state that drives them.
#[derive(Debug)]
pub struct Village {
    world: World,
    manager: DialogueManager,
    settings: VillageSettings,
    rng: StdRng,
    now: SimTime,
    tick: u64,
    started: u64,
    closed: u64,
}

impl Village {
    /// Assemble a village at simulated time zero.
    pub const fn new(world: World, manager: DialogueManager, settings: VillageSettings, rng: StdRng) -> Self {
        Self {
            world,
            manager,
            settings,
            rng,
            now: SimTime::ZERO,
            tick: 0,
            started: 0,
            closed: 0,
        }
    }

    /// The world as of the last tick.
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The dialogue manager.
    pub const fn manager(&self) -> &DialogueManager {
        &self.manager
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickSummary {
        self.tick = self.tick.saturating_add(1);
        self.now = self.now.plus_secs(self.settings.secs_per_tick);
        let mut summary = TickSummary {
            tick: self.tick,
            now: self.now,
            ..TickSummary::default()
        };

        let manager = &self.manager;
        summary.moved = village::wander(
            &mut self.world,
            self.settings.grid_size,
            |id| manager.is_busy(id),
            &mut self.rng,
        );

        let pairs = village::nearby_pairs(&self.world, self.settings.talk_radius, |id| manager.is_busy(id));
        for (a, b) in pairs {
            match self.manager.try_initiate(&self.world, a, b, self.now) {
                Ok(session_id) => {
                    debug!(session_id = %session_id, tick = self.tick, "Pair started talking");
                    summary.started = summary.started.saturating_add(1);
                }
                Err(InitiateRejection::OnCooldown { .. } | InitiateRejection::Unwilling { .. }) => {}
                Err(rejection) => debug!(reason = %rejection, "Pair not started"),
            }
        }

        let report = self.manager.update(&mut self.world, self.now);
        summary.closed = report.closed.len();

        summary.announcements = self.manager.drain_announcements();
        for announcement in &summary.announcements {
            publish(announcement);
        }

        if self.settings.decay_interval_ticks > 0
            && self.tick.checked_rem(self.settings.decay_interval_ticks) == Some(0)
        {
            self.world
                .decay_relationships(self.now, self.manager.config().decay_per_hour);
            let purged = self.world.cooldowns.purge_expired(self.now);
            let elapsed = self
                .settings
                .decay_interval_ticks
                .saturating_mul(self.settings.secs_per_tick);
            let healed = self
                .world
                .regenerate_health(elapsed, self.settings.health_regen_per_hour);
            debug!(tick = self.tick, purged, healed, "Relationship decay pass");
        }

        self.started = self.started.saturating_add(u64::try_from(summary.started).unwrap_or(u64::MAX));
        self.closed = self.closed.saturating_add(u64::try_from(summary.closed).unwrap_or(u64::MAX));
        summary
    }

    /// Tick until the tick limit or until `stop` is raised, sleeping
    /// `tick_interval_ms` between ticks. Consumes the village.
    pub async fn run(mut self, stop: Arc<AtomicBool>) -> RunSummary {
        info!(
            villagers = self.world.len(),
            max_ticks = self.settings.max_ticks,
            tick_interval_ms = self.settings.tick_interval_ms,
            secs_per_tick = self.settings.secs_per_tick,
            "Village starting"
        );

        let end_reason = loop {
            // --- Check stop request (before tick) ---
            if stop.load(Ordering::Acquire) {
                info!(tick = self.tick, "Stop requested");
                break EndReason::Stopped;
            }

            let summary = self.tick();
            if summary.started > 0 || summary.closed > 0 {
                info!(
                    tick = summary.tick,
                    at = %summary.now,
                    started = summary.started,
                    closed = summary.closed,
                    moved = summary.moved,
                    active = self.manager.active_count(),
                    "Tick"
                );
            }

            // --- Check tick limit (after tick) ---
            if self.settings.max_ticks > 0 && self.tick >= self.settings.max_ticks {
                info!(tick = self.tick, max_ticks = self.settings.max_ticks, "Tick limit reached");
                break EndReason::TickLimit;
            }

            if self.settings.tick_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.tick_interval_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
        };

        let cancelled_requests = self.manager.shutdown();
        RunSummary {
            end_reason,
            total_ticks: self.tick,
            ended_at: self.now,
            conversations_started: self.started,
            conversations_closed: self.closed,
            cancelled_requests,
        }
    }
}

/// Hand an announcement to the presentation layer, which for this binary
/// is the log.
fn publish(announcement: &Announcement) {
    match announcement.placement {
        Placement::Anchored { x, y } => info!(
            target: "hamlet::announce",
            session_id = %announcement.session_id,
            x,
            y,
            duration_ticks = announcement.duration_ticks,
            "{}",
            announcement.text
        ),
        Placement::Centered => info!(
            target: "hamlet::announce",
            session_id = %announcement.session_id,
            duration_ticks = announcement.duration_ticks,
            "{}",
            announcement.text
        ),
    }
}

/// Log the end-of-run tally.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        end_reason = ?summary.end_reason,
        total_ticks = summary.total_ticks,
        ended_at = %summary.ended_at,
        conversations_started = summary.conversations_started,
        conversations_closed = summary.conversations_closed,
        cancelled_requests = summary.cancelled_requests,
        "Village run complete"
    );
}
