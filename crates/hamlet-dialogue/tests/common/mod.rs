//! Shared fixtures for the dialogue integration tests.
#![allow(dead_code, clippy::unwrap_used, missing_docs)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hamlet_agents::{Agent, World};
use hamlet_dialogue::{DialogueConfig, DialogueManager, MemoryStageSink, PromptEngine, UpdateReport};
use hamlet_oracle::{BudgetConfig, Generation, OracleClient, OracleError, RateBudget, RetryPolicy, TextOracle};
use hamlet_types::{AgentId, Personality, SimTime, Stage};

pub const QUIET_ACTION: &str = r#"{"action_detected": false}"#;
pub const QUIET_OUTCOME: &str = r#"{"success": false, "narrative": "", "actor_effects": {}, "target_effects": {}}"#;
pub const WARM_REFLECTION: &str = "SUMMARY: We chatted about the weather.\nFEELING: 0.1\nOBSERVATION: nothing notable";
pub const DEFAULT_LINE: &str = "Good day to you.";

/// Answers by recognising which stage's prompt it was sent.
pub struct VillageOracle {
    lines: Mutex<VecDeque<String>>,
    action: String,
    outcome: String,
    reflection: String,
    delay: Duration,
    calls: Mutex<Vec<Stage>>,
}

impl VillageOracle {
    /// Plain small talk, no actions.
    pub fn quiet() -> Arc<Self> {
        Self::scripted(&[], QUIET_ACTION, QUIET_OUTCOME)
    }

    /// Speaks `lines` in order, then [`DEFAULT_LINE`].
    pub fn scripted(lines: &[&str], action: &str, outcome: &str) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(lines.iter().map(|l| (*l).to_owned()).collect()),
            action: action.to_owned(),
            outcome: outcome.to_owned(),
            reflection: WARM_REFLECTION.to_owned(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Never answers within any sensible deadline.
    pub fn unreachable() -> Arc<Self> {
        Self::slow(Duration::from_secs(30))
    }

    /// Answers quietly, but only after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::quiet_parts()
        })
    }

    fn quiet_parts() -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            action: QUIET_ACTION.to_owned(),
            outcome: QUIET_OUTCOME.to_owned(),
            reflection: WARM_REFLECTION.to_owned(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received for one stage, counting retries.
    pub fn calls_for(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|s| **s == stage).count())
            .unwrap_or_default()
    }

    /// Calls received in total.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

fn classify(prompt: &str) -> Stage {
    if prompt.contains("SUMMARY:") {
        Stage::Reflection
    } else if prompt.contains("actor_effects") {
        Stage::Outcome
    } else if prompt.contains("action_detected") {
        Stage::Action
    } else {
        Stage::Dialogue
    }
}

#[async_trait]
impl TextOracle for VillageOracle {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<Generation, OracleError> {
        let stage = classify(prompt);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(stage);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = match stage {
            Stage::Dialogue => self
                .lines
                .lock()
                .ok()
                .and_then(|mut lines| lines.pop_front())
                .unwrap_or_else(|| DEFAULT_LINE.to_owned()),
            Stage::Action => self.action.clone(),
            Stage::Outcome => self.outcome.clone(),
            Stage::Reflection => self.reflection.clone(),
        };
        Ok(Generation {
            text,
            tokens_used: Some(20),
        })
    }

    fn name(&self) -> &str {
        "village"
    }
}

/// Client with a generous budget, a short deadline and no jitter.
pub fn client(oracle: &Arc<VillageOracle>, call_timeout: Duration) -> Arc<OracleClient> {
    let budget = BudgetConfig {
        requests_per_window: 1_000,
        tokens_per_window: 1_000_000,
        window: Duration::from_secs(60),
    };
    let retry = RetryPolicy {
        max_admission_retries: 3,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        jitter_max: Duration::ZERO,
    };
    Arc::new(OracleClient::new(
        Arc::clone(oracle) as Arc<dyn TextOracle>,
        None,
        Arc::new(RateBudget::new(budget)),
        call_timeout,
        retry,
    ))
}

pub fn config(max_turns: u32) -> DialogueConfig {
    DialogueConfig {
        max_turns_per_participant: max_turns,
        ..DialogueConfig::default()
    }
}

/// Manager that always finds both agents willing, with records kept in memory.
pub fn manager(
    oracle: &Arc<VillageOracle>,
    config: DialogueConfig,
    call_timeout: Duration,
) -> (DialogueManager, MemoryStageSink) {
    let sink = MemoryStageSink::new();
    let prompts = Arc::new(PromptEngine::with_defaults().unwrap());
    let manager = DialogueManager::new(
        config,
        client(oracle, call_timeout),
        prompts,
        tokio::runtime::Handle::current(),
    )
    .unwrap()
    .with_sink(Arc::new(sink.clone()))
    .with_willingness(|_: &Agent, _: &Agent| true);
    (manager, sink)
}

pub struct Village {
    pub world: World,
    pub mara: AgentId,
    pub bram: AgentId,
}

pub fn village() -> Village {
    let mut world = World::new();
    let mara = world
        .insert(
            Agent::new("Mara", "baker", Personality::default())
                .with_gold(20)
                .with_item("bread", 2)
                .with_position(3, 4),
        )
        .unwrap();
    let bram = world
        .insert(Agent::new("Bram", "blacksmith", Personality::default()).with_gold(10))
        .unwrap();
    Village { world, mara, bram }
}

/// Poll `update` until no session is active. Returns the simulated time
/// of the final update and every report.
pub async fn run_until_idle(
    manager: &mut DialogueManager,
    world: &mut World,
    start: SimTime,
) -> Option<(SimTime, Vec<UpdateReport>)> {
    let mut now = start;
    let mut reports = Vec::new();
    for _ in 0..800 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        now = now.plus_secs(1);
        let report = manager.update(world, now);
        let closed = !report.closed.is_empty();
        reports.push(report);
        if closed && manager.active_count() == 0 {
            return Some((now, reports));
        }
    }
    None
}
