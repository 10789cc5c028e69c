//! The single entry point for oracle calls.
//!
//! [`OracleClient::send`] wraps one backend call with everything the
//! pipeline relies on:
//!
//! 1. Rate-budget admission, with bounded exponential backoff while the
//!    budget is deferred. Running out of attempts surfaces `RateLimited`.
//! 2. A per-call deadline via `tokio::time::timeout`.
//! 3. One jittered retry after a `Timeout` or `Transport` failure. A second
//!    failure goes back to the caller, which owns the fallback.
//! 4. Cancellation checkpoints before admission, after every wait, and after
//!    the call returns.
//!
//! The client is `Send + Sync` and is shared across workers via `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hamlet_types::{ModelTier, Stage};
use rand::Rng;
use tracing::{debug, warn};

use crate::backend::{SharedOracle, create_backend};
use crate::budget::{Admission, RateBudget, Reservation};
use crate::config::{OracleConfig, RetryPolicy};
use crate::error::OracleError;

/// Rough characters-per-token ratio used for admission estimates.
const CHARS_PER_TOKEN: usize = 4;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cancellation flag for one in-flight request.
///
/// Cloning shares the flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the request cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn checkpoint(&self) -> Result<(), OracleError> {
        if self.is_cancelled() {
            Err(OracleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// One prompt to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Pipeline stage, for logs.
    pub stage: Stage,
    /// Which backend tier to route to.
    pub tier: ModelTier,
    /// Full prompt text.
    pub prompt: String,
    /// Output token cap.
    pub max_tokens: u32,
}

impl OracleRequest {
    /// Tokens charged against the budget at admission.
    pub fn estimated_tokens(&self) -> u32 {
        u32::try_from(self.prompt.len() / CHARS_PER_TOKEN)
            .unwrap_or(u32::MAX)
            .saturating_add(self.max_tokens)
    }
}

/// A successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReply {
    /// Model output.
    pub text: String,
    /// Tokens billed, or the admission estimate when the backend did not say.
    pub tokens_used: u32,
    /// Backend that answered.
    pub backend: String,
    /// Wall time from `send` to reply, including waits.
    pub latency: Duration,
    /// Backend calls made (1, or 2 after a transient retry).
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Budgeted, deadline-bounded access to the configured backends.
pub struct OracleClient {
    fast: SharedOracle,
    smart: Option<SharedOracle>,
    budget: Arc<RateBudget>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl OracleClient {
    /// Assemble a client from parts. Used directly by tests.
    pub const fn new(
        fast: SharedOracle,
        smart: Option<SharedOracle>,
        budget: Arc<RateBudget>,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fast,
            smart,
            budget,
            call_timeout,
            retry,
        }
    }

    /// Build HTTP backends and a fresh budget from configuration.
    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(
            create_backend(&config.fast_backend),
            config.smart_backend.as_ref().map(create_backend),
            Arc::new(RateBudget::new(config.budget)),
            config.call_timeout,
            config.retry,
        )
    }

    /// The shared budget, for usage reporting.
    pub const fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    /// Backend serving `tier`. The smart tier falls back to the fast backend.
    pub fn backend_for(&self, tier: ModelTier) -> &SharedOracle {
        match (tier, &self.smart) {
            (ModelTier::Smart, Some(smart)) => smart,
            _ => &self.fast,
        }
    }

    /// Send one request.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited`, `Timeout`, `Transport` or `MalformedResponse`
    /// once the retry policy is exhausted, and `Cancelled` if `cancel` was
    /// set at any checkpoint.
    pub async fn send(
        &self,
        request: &OracleRequest,
        cancel: &CancelFlag,
    ) -> Result<OracleReply, OracleError> {
        let started = Instant::now();
        let backend = self.backend_for(request.tier);
        let mut attempts: u32 = 0;

        loop {
            let reservation = self.admit(request, cancel).await?;
            attempts = attempts.saturating_add(1);

            debug!(
                stage = %request.stage,
                backend = backend.name(),
                attempt = attempts,
                estimated_tokens = reservation.estimated_tokens(),
                "oracle call"
            );

            let result = match tokio::time::timeout(
                self.call_timeout,
                backend.generate(&request.prompt, request.max_tokens),
            )
            .await
            {
                Err(_) | Ok(Err(OracleError::Timeout(_))) => {
                    Err(OracleError::Timeout(self.call_timeout))
                }
                Ok(other) => other,
            };
            cancel.checkpoint()?;

            match result {
                Ok(generation) => {
                    let tokens_used = generation
                        .tokens_used
                        .unwrap_or_else(|| reservation.estimated_tokens());
                    self.budget.reconcile(&reservation, tokens_used);
                    return Ok(OracleReply {
                        text: generation.text,
                        tokens_used,
                        backend: backend.name().to_owned(),
                        latency: started.elapsed(),
                        attempts,
                    });
                }
                Err(err) if err.is_transient() && attempts < 2 => {
                    let delay = self.jitter();
                    warn!(
                        stage = %request.stage,
                        backend = backend.name(),
                        error = %err,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient oracle failure, retrying once"
                    );
                    tokio::time::sleep(delay).await;
                    cancel.checkpoint()?;
                }
                Err(err) => {
                    warn!(
                        stage = %request.stage,
                        backend = backend.name(),
                        error = %err,
                        attempts = attempts,
                        "oracle call failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Wait for budget admission, backing off while deferred.
    async fn admit(
        &self,
        request: &OracleRequest,
        cancel: &CancelFlag,
    ) -> Result<Reservation, OracleError> {
        let estimated = request.estimated_tokens();
        let mut attempt: u32 = 0;
        loop {
            cancel.checkpoint()?;
            match self.budget.try_admit(estimated) {
                Admission::Admitted(reservation) => return Ok(reservation),
                Admission::Rejected => {
                    warn!(
                        stage = %request.stage,
                        estimated_tokens = estimated,
                        "request exceeds token ceiling"
                    );
                    return Err(OracleError::RateLimited {
                        retry_after: self.budget.config().window,
                    });
                }
                Admission::Deferred { retry_after } => {
                    if attempt >= self.retry.max_admission_retries {
                        return Err(OracleError::RateLimited { retry_after });
                    }
                    let delay = self.backoff(attempt, retry_after);
                    debug!(
                        stage = %request.stage,
                        attempt = attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "rate budget deferred, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// `base * 2^attempt`, capped by the policy maximum and by how long the
    /// budget says it needs.
    fn backoff(&self, attempt: u32, retry_after: Duration) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .retry
            .backoff_base
            .saturating_mul(factor)
            .min(self.retry.backoff_max);
        if retry_after.is_zero() {
            delay
        } else {
            delay.min(retry_after)
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.retry.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{Generation, TextOracle};
    use crate::config::BudgetConfig;

    /// Replays a fixed list of results, then repeats the last one.
    struct Scripted {
        results: Mutex<Vec<Result<Generation, OracleError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl Scripted {
        fn new(results: Vec<Result<Generation, OracleError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(vec![Ok(text("late"))]),
                calls: AtomicU32::new(0),
                delay,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextOracle for Scripted {
        async fn generate(&self, _prompt: &str, _max: u32) -> Result<Generation, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let Ok(mut results) = self.results.lock() else {
                return Err(OracleError::Transport("poisoned".to_owned()));
            };
            if results.len() > 1 {
                results.remove(0)
            } else {
                results
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Err(OracleError::Transport("empty script".to_owned())))
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn text(s: &str) -> Generation {
        Generation {
            text: s.to_owned(),
            tokens_used: Some(10),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_admission_retries: 2,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(4),
            jitter_max: Duration::from_millis(2),
        }
    }

    fn client_with(oracle: Arc<Scripted>, budget: BudgetConfig, timeout: Duration) -> OracleClient {
        OracleClient::new(
            oracle,
            None,
            Arc::new(RateBudget::new(budget)),
            timeout,
            fast_policy(),
        )
    }

    fn request() -> OracleRequest {
        OracleRequest {
            stage: Stage::Dialogue,
            tier: ModelTier::Fast,
            prompt: "Say hello.".to_owned(),
            max_tokens: 50,
        }
    }

    #[tokio::test]
    async fn success_reconciles_budget() {
        let oracle = Scripted::new(vec![Ok(text("Hello there."))]);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), Duration::from_secs(1));
        let reply = client.send(&request(), &CancelFlag::new()).await;
        assert_eq!(reply.as_ref().map(|r| r.text.as_str()).ok(), Some("Hello there."));
        assert_eq!(client.budget().usage().tokens, 10);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried_once() {
        let oracle = Scripted::new(vec![
            Err(OracleError::Transport("connection reset".to_owned())),
            Ok(text("Second time lucky.")),
        ]);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), Duration::from_secs(1));
        let reply = client.send(&request(), &CancelFlag::new()).await;
        assert_eq!(reply.map(|r| r.attempts).ok(), Some(2));
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces() {
        let oracle = Scripted::new(vec![Err(OracleError::Transport("down".to_owned()))]);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), Duration::from_secs(1));
        let reply = client.send(&request(), &CancelFlag::new()).await;
        assert!(matches!(reply, Err(OracleError::Transport(_))));
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn malformed_response_is_not_retried() {
        let oracle = Scripted::new(vec![Err(OracleError::MalformedResponse("no content".to_owned()))]);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), Duration::from_secs(1));
        let reply = client.send(&request(), &CancelFlag::new()).await;
        assert!(matches!(reply, Err(OracleError::MalformedResponse(_))));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn deadline_maps_to_timeout() {
        let oracle = Scripted::slow(Duration::from_secs(5));
        let timeout = Duration::from_millis(20);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), timeout);
        let reply = client.send(&request(), &CancelFlag::new()).await;
        assert_eq!(reply, Err(OracleError::Timeout(timeout)));
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_rate_limited() {
        let oracle = Scripted::new(vec![Ok(text("hi"))]);
        let budget = BudgetConfig {
            requests_per_window: 1,
            tokens_per_window: 10_000,
            window: Duration::from_secs(60),
        };
        let client = client_with(Arc::clone(&oracle), budget, Duration::from_secs(1));
        assert!(client.send(&request(), &CancelFlag::new()).await.is_ok());
        let second = client.send(&request(), &CancelFlag::new()).await;
        assert!(matches!(second, Err(OracleError::RateLimited { .. })));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_request_never_calls_backend() {
        let oracle = Scripted::new(vec![Ok(text("hi"))]);
        let client = client_with(Arc::clone(&oracle), BudgetConfig::default(), Duration::from_secs(1));
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert_eq!(client.send(&request(), &cancel).await, Err(OracleError::Cancelled));
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let oracle = Scripted::new(vec![Ok(text("hi"))]);
        let client = client_with(oracle, BudgetConfig::default(), Duration::from_secs(1));
        let long = Duration::from_secs(60);
        assert_eq!(client.backoff(0, long), Duration::from_millis(1));
        assert_eq!(client.backoff(1, long), Duration::from_millis(2));
        assert_eq!(client.backoff(5, long), Duration::from_millis(4));
        assert_eq!(client.backoff(5, Duration::from_millis(3)), Duration::from_millis(3));
    }

    #[test]
    fn smart_tier_falls_back_to_fast() {
        let oracle = Scripted::new(vec![Ok(text("hi"))]);
        let client = client_with(oracle, BudgetConfig::default(), Duration::from_secs(1));
        assert_eq!(client.backend_for(ModelTier::Smart).name(), "scripted");
    }
}
