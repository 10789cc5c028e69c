//! Rolling-window request and token budget.
//!
//! Every admitted call is charged up front: one request and its estimated
//! token count. When the backend reports real usage, [`RateBudget::reconcile`]
//! swaps the estimate for the actual figure. Entries older than the window
//! are evicted on every call, which is the window rotation.
//!
//! The budget is shared by all workers behind a [`std::sync::Mutex`]. The
//! lock is only ever held for bookkeeping, never across an await.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::BudgetConfig;

/// Result of asking the budget for room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed. Hand the reservation back to `reconcile`.
    Admitted(Reservation),
    /// No room right now. Try again after `retry_after`.
    Deferred {
        /// Time until enough of the window has rolled off.
        retry_after: Duration,
    },
    /// The request can never fit (its estimate alone exceeds the ceiling).
    Rejected,
}

/// Proof of an admitted call, used to correct its token charge later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: u64,
    estimated_tokens: u32,
}

impl Reservation {
    /// Tokens charged at admission.
    pub const fn estimated_tokens(&self) -> u32 {
        self.estimated_tokens
    }
}

/// Point-in-time view of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetUsage {
    /// Requests inside the window.
    pub requests: u32,
    /// Tokens charged inside the window.
    pub tokens: u64,
}

/// Thread-safe rolling request/token budget.
pub struct RateBudget {
    config: BudgetConfig,
    inner: Mutex<Window>,
}

#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<Entry>,
    tokens: u64,
    next_id: u64,
}

#[derive(Debug)]
struct Entry {
    id: u64,
    at: Instant,
    tokens: u32,
}

impl Window {
    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.at) < window {
                break;
            }
            self.tokens = self.tokens.saturating_sub(u64::from(front.tokens));
            self.entries.pop_front();
        }
    }

    fn request_count(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Time until the entry at `index` leaves the window.
    fn expiry_of(&self, index: usize, now: Instant, window: Duration) -> Duration {
        self.entries
            .get(index)
            .map_or(Duration::ZERO, |e| window.saturating_sub(now.duration_since(e.at)))
    }
}

impl RateBudget {
    /// Create a budget with the given ceilings.
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Window::default()),
        }
    }

    /// The configured ceilings.
    pub const fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Try to admit a call expected to use `estimated_tokens`.
    pub fn try_admit(&self, estimated_tokens: u32) -> Admission {
        self.try_admit_at(estimated_tokens, Instant::now())
    }

    /// [`try_admit`](Self::try_admit) with an explicit clock reading.
    pub fn try_admit_at(&self, estimated_tokens: u32, now: Instant) -> Admission {
        if estimated_tokens > self.config.tokens_per_window || self.config.requests_per_window == 0 {
            return Admission::Rejected;
        }
        let Ok(mut inner) = self.inner.lock() else {
            warn!("rate budget lock poisoned, deferring");
            return Admission::Deferred {
                retry_after: self.config.window,
            };
        };
        inner.evict(now, self.config.window);

        let token_ceiling = u64::from(self.config.tokens_per_window);
        let wanted = u64::from(estimated_tokens);
        let requests_full = inner.request_count() >= self.config.requests_per_window;
        let tokens_full = inner.tokens.saturating_add(wanted) > token_ceiling;

        if !requests_full && !tokens_full {
            let id = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);
            inner.tokens = inner.tokens.saturating_add(wanted);
            inner.entries.push_back(Entry {
                id,
                at: now,
                tokens: estimated_tokens,
            });
            return Admission::Admitted(Reservation {
                id,
                estimated_tokens,
            });
        }

        let mut retry_after = Duration::ZERO;
        if requests_full {
            // The oldest entries must leave until one slot frees up.
            let overflow = usize::try_from(
                inner
                    .request_count()
                    .saturating_sub(self.config.requests_per_window),
            )
            .unwrap_or(0);
            retry_after = retry_after.max(inner.expiry_of(overflow, now, self.config.window));
        }
        if tokens_full {
            let mut remaining = inner.tokens;
            for (index, entry) in inner.entries.iter().enumerate() {
                remaining = remaining.saturating_sub(u64::from(entry.tokens));
                if remaining.saturating_add(wanted) <= token_ceiling {
                    retry_after = retry_after.max(inner.expiry_of(index, now, self.config.window));
                    break;
                }
            }
        }
        Admission::Deferred { retry_after }
    }

    /// Replace a reservation's estimated tokens with the actual usage.
    ///
    /// A reservation whose entry already rolled out of the window is ignored.
    pub fn reconcile(&self, reservation: &Reservation, actual_tokens: u32) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let Some(entry) = inner.entries.iter_mut().find(|e| e.id == reservation.id) else {
            return;
        };
        let previous = entry.tokens;
        entry.tokens = actual_tokens;
        inner.tokens = inner
            .tokens
            .saturating_sub(u64::from(previous))
            .saturating_add(u64::from(actual_tokens));
    }

    /// Current usage.
    pub fn usage(&self) -> BudgetUsage {
        self.usage_at(Instant::now())
    }

    /// [`usage`](Self::usage) with an explicit clock reading.
    pub fn usage_at(&self, now: Instant) -> BudgetUsage {
        let Ok(mut inner) = self.inner.lock() else {
            return BudgetUsage {
                requests: 0,
                tokens: 0,
            };
        };
        inner.evict(now, self.config.window);
        BudgetUsage {
            requests: inner.request_count(),
            tokens: inner.tokens,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn budget(requests: u32, tokens: u32) -> RateBudget {
        RateBudget::new(BudgetConfig {
            requests_per_window: requests,
            tokens_per_window: tokens,
            window: Duration::from_secs(60),
        })
    }

    fn later(start: Instant, secs: u64) -> Instant {
        start.checked_add(Duration::from_secs(secs)).unwrap_or(start)
    }

    #[test]
    fn admits_until_request_ceiling() {
        let b = budget(2, 1_000);
        let t0 = Instant::now();
        assert!(matches!(b.try_admit_at(10, t0), Admission::Admitted(_)));
        assert!(matches!(b.try_admit_at(10, later(t0, 5)), Admission::Admitted(_)));
        match b.try_admit_at(10, later(t0, 10)) {
            Admission::Deferred { retry_after } => assert_eq!(retry_after, Duration::from_secs(50)),
            other => panic!("expected deferral, got {other:?}"),
        }
    }

    #[test]
    fn window_rotation_frees_capacity() {
        let b = budget(1, 1_000);
        let t0 = Instant::now();
        assert!(matches!(b.try_admit_at(10, t0), Admission::Admitted(_)));
        assert!(matches!(b.try_admit_at(10, later(t0, 59)), Admission::Deferred { .. }));
        assert!(matches!(b.try_admit_at(10, later(t0, 60)), Admission::Admitted(_)));
    }

    #[test]
    fn token_ceiling_defers_until_enough_rolls_off() {
        let b = budget(10, 100);
        let t0 = Instant::now();
        assert!(matches!(b.try_admit_at(40, t0), Admission::Admitted(_)));
        assert!(matches!(b.try_admit_at(40, later(t0, 20)), Admission::Admitted(_)));
        match b.try_admit_at(50, later(t0, 30)) {
            // Only the first entry needs to leave: 40 + 50 <= 100.
            Admission::Deferred { retry_after } => assert_eq!(retry_after, Duration::from_secs(30)),
            other => panic!("expected deferral, got {other:?}"),
        }
    }

    #[test]
    fn oversized_estimate_is_rejected() {
        let b = budget(10, 100);
        assert_eq!(b.try_admit(101), Admission::Rejected);
    }

    #[test]
    fn reconcile_returns_unused_tokens() {
        let b = budget(10, 100);
        let t0 = Instant::now();
        let Admission::Admitted(reservation) = b.try_admit_at(90, t0) else {
            panic!("first call should be admitted");
        };
        assert!(matches!(b.try_admit_at(20, t0), Admission::Deferred { .. }));
        b.reconcile(&reservation, 30);
        assert_eq!(b.usage_at(t0).tokens, 30);
        assert!(matches!(b.try_admit_at(20, t0), Admission::Admitted(_)));
    }

    #[test]
    fn concurrent_admissions_respect_ceiling() {
        let b = Arc::new(budget(25, 1_000_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| matches!(b.try_admit(1), Admission::Admitted(_)))
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
        assert_eq!(b.usage().requests, 25);
    }
}
