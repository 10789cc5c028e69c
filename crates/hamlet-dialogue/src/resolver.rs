//! Deciding what an extracted action actually does.
//!
//! The oracle proposes an outcome; nothing it says touches agent state
//! directly. Every proposed effect is re-checked against a snapshot of the
//! two agents by [`state_manager::validate`] before it can be applied. When
//! the oracle fails, or proposes something impossible, the action fizzles
//! with a neutral narrative and no effects.
//!
//! Effects between the two agents conserve goods: whatever one side
//! receives, the other side gives up.

use std::collections::BTreeMap;
use std::sync::Arc;

use hamlet_agents::inventory::{display_item, normalize_item};
use hamlet_agents::state_manager::{self, MAX_RELATIONSHIP_DELTA};
use hamlet_agents::{Agent, AgentError};
use hamlet_oracle::{CancelFlag, OracleClient, OracleError, OracleRequest, parse_json};
use hamlet_types::{Effect, Stage};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::StageSetting;
use crate::error::DialogueError;
use crate::interpreter::ActionDraft;
use crate::prompt::PromptEngine;
use crate::session::TranscriptEntry;

/// Narrative used when no outcome could be obtained.
pub const FALLBACK_NARRATIVE: &str = "Nothing comes of it.";

// ---------------------------------------------------------------------------
// Raw oracle reply
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawOutcome {
    success: bool,
    #[serde(default)]
    narrative: String,
    #[serde(default)]
    relationship_delta: Option<Decimal>,
    #[serde(default)]
    actor_effects: RawEffects,
    #[serde(default)]
    target_effects: RawEffects,
}

#[derive(Debug, Default, Deserialize)]
struct RawEffects {
    #[serde(default)]
    health: Option<Decimal>,
    #[serde(default)]
    gold: Option<Decimal>,
    #[serde(default)]
    add_condition: Option<String>,
    #[serde(default)]
    remove_condition: Option<String>,
    #[serde(default)]
    add_items: Vec<RawItem>,
    #[serde(default)]
    remove_items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawItem {
    Counted {
        #[serde(alias = "name")]
        item: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    Named(String),
}

const fn one() -> u32 {
    1
}

impl RawItem {
    fn into_parts(self) -> (String, u32) {
        match self {
            Self::Counted { item, quantity } => (item, quantity),
            Self::Named(item) => (item, 1),
        }
    }
}

impl RawEffects {
    fn into_effects(self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(delta) = self.health.and_then(|d| d.round().to_i32())
            && delta != 0
        {
            effects.push(Effect::Health { delta });
        }
        if let Some(delta) = self.gold.and_then(|d| d.round().to_i64())
            && delta != 0
        {
            effects.push(Effect::Gold { delta });
        }
        if let Some(condition) = non_blank(self.remove_condition) {
            effects.push(Effect::RemoveCondition { condition });
        }
        if let Some(condition) = non_blank(self.add_condition) {
            effects.push(Effect::AddCondition { condition });
        }
        // Removals first so a swap cannot spend what it is about to receive.
        for raw in self.remove_items {
            let (item, quantity) = raw.into_parts();
            effects.push(Effect::RemoveItem { item, quantity });
        }
        for raw in self.add_items {
            let (item, quantity) = raw.into_parts();
            effects.push(Effect::AddItem { item, quantity });
        }
        effects
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("none"))
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Make every credit in a proposal come out of the other party.
///
/// Items one side receives are taken from the other side, topping up any
/// removal already proposed. Gold one side receives is paid by the other
/// and never exceeds the payer's purse. Debits with no matching credit
/// stand as proposed: bread can be eaten and fines paid to nobody.
pub fn settle_transfers(
    actor_effects: Vec<Effect>,
    target_effects: Vec<Effect>,
    actor: &Agent,
    target: &Agent,
) -> (Vec<Effect>, Vec<Effect>) {
    let (actor_gold, target_gold) = fund_gold(
        gold_delta(&actor_effects),
        gold_delta(&target_effects),
        actor.gold,
        target.gold,
    );
    let mut actor_effects = set_gold(actor_effects, actor_gold);
    let mut target_effects = set_gold(target_effects, target_gold);
    fund_items(&target_effects, &mut actor_effects);
    fund_items(&actor_effects, &mut target_effects);
    (actor_effects, target_effects)
}

fn gold_delta(effects: &[Effect]) -> i64 {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Gold { delta } => Some(*delta),
            _ => None,
        })
        .fold(0, i64::saturating_add)
}

/// Settled gold deltas for `(actor, target)`.
fn fund_gold(actor_delta: i64, target_delta: i64, actor_purse: u32, target_purse: u32) -> (i64, i64) {
    // Credits on both sides cancel first.
    let (actor_delta, target_delta) = if actor_delta > 0 && target_delta > 0 {
        let net = actor_delta.saturating_sub(target_delta);
        (net.max(0), net.min(0).saturating_neg())
    } else {
        (actor_delta, target_delta)
    };
    if actor_delta > 0 {
        let paid = actor_delta.min(i64::from(target_purse));
        (paid, target_delta.min(paid.saturating_neg()))
    } else if target_delta > 0 {
        let paid = target_delta.min(i64::from(actor_purse));
        (actor_delta.min(paid.saturating_neg()), paid)
    } else {
        (actor_delta, target_delta)
    }
}

/// Replace every gold effect with a single one carrying `delta`.
fn set_gold(effects: Vec<Effect>, delta: i64) -> Vec<Effect> {
    let mut settled = Vec::with_capacity(effects.len().saturating_add(1));
    let mut placed = delta == 0;
    for effect in effects {
        if matches!(effect, Effect::Gold { .. }) {
            if !placed {
                settled.push(Effect::Gold { delta });
                placed = true;
            }
        } else {
            settled.push(effect);
        }
    }
    if !placed {
        settled.push(Effect::Gold { delta });
    }
    settled
}

/// Make `giver` remove at least what `receiver` adds, item by item.
fn fund_items(receiver: &[Effect], giver: &mut Vec<Effect>) {
    let mut wanted: BTreeMap<String, u32> = BTreeMap::new();
    for effect in receiver {
        if let Effect::AddItem { item, quantity } = effect {
            let total = wanted.entry(normalize_item(item)).or_default();
            *total = total.saturating_add(*quantity);
        }
    }
    for (item, quantity) in wanted {
        let given = giver
            .iter()
            .filter_map(|effect| match effect {
                Effect::RemoveItem { item: other, quantity } if normalize_item(other) == item => Some(*quantity),
                _ => None,
            })
            .fold(0, u32::saturating_add);
        if given >= quantity {
            continue;
        }
        // Removals stay ahead of additions.
        let at = giver
            .iter()
            .position(|effect| matches!(effect, Effect::AddItem { .. }))
            .unwrap_or(giver.len());
        giver.insert(
            at,
            Effect::RemoveItem {
                item: display_item(&item),
                quantity: quantity.saturating_sub(given),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Proposed and final outcomes
// ---------------------------------------------------------------------------

/// What the oracle proposed, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedOutcome {
    /// Whether the action succeeded.
    pub success: bool,
    /// The oracle's narrative, possibly empty.
    pub narrative: String,
    /// Effects on the actor.
    pub actor_effects: Vec<Effect>,
    /// Effects on the target, including how the target now feels about
    /// the actor.
    pub target_effects: Vec<Effect>,
}

/// Parse the oracle's outcome reply for `draft`.
pub fn parse_outcome(raw: &str, draft: &ActionDraft) -> Result<ProposedOutcome, OracleError> {
    let parsed: RawOutcome = parse_json(raw)?;
    let mut target_effects = parsed.target_effects.into_effects();
    if let Some(delta) = parsed.relationship_delta
        && !delta.is_zero()
    {
        target_effects.push(Effect::Relationship {
            toward: draft.actor,
            delta: delta.clamp(-MAX_RELATIONSHIP_DELTA, MAX_RELATIONSHIP_DELTA),
        });
    }
    Ok(ProposedOutcome {
        success: parsed.success,
        narrative: parsed.narrative.trim().to_owned(),
        actor_effects: parsed.actor_effects.into_effects(),
        target_effects,
    })
}

/// A validated outcome, safe to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the action succeeded.
    pub success: bool,
    /// One-sentence narration, never empty.
    pub narrative: String,
    /// Validated effects on the actor.
    pub actor_effects: Vec<Effect>,
    /// Validated effects on the target.
    pub target_effects: Vec<Effect>,
    /// Individual effects dropped during validation.
    pub dropped: Vec<AgentError>,
}

impl Outcome {
    /// The outcome used when the oracle could not be consulted.
    pub fn fallback() -> Self {
        Self {
            success: false,
            narrative: FALLBACK_NARRATIVE.to_owned(),
            actor_effects: Vec::new(),
            target_effects: Vec::new(),
            dropped: Vec::new(),
        }
    }

    /// Whether any effect survived validation.
    pub fn has_effects(&self) -> bool {
        !self.actor_effects.is_empty() || !self.target_effects.is_empty()
    }
}

/// Validate `proposal` against the current state of both agents.
///
/// An oracle error yields [`Outcome::fallback`]. Transfers are settled
/// first (see [`settle_transfers`]). A batch that asks either agent to give
/// away an item they lack downgrades the whole action to a failure with no
/// effects. Other invalid effects are dropped one by one.
pub fn finalize(
    proposal: Result<ProposedOutcome, OracleError>,
    draft: &ActionDraft,
    actor: &Agent,
    target: &Agent,
) -> Outcome {
    let proposal = match proposal {
        Ok(proposal) => proposal,
        Err(e) => {
            warn!(actor = %actor.name, error = %e, "Outcome unavailable, action fizzles");
            return Outcome::fallback();
        }
    };

    let (actor_effects, target_effects) =
        settle_transfers(proposal.actor_effects, proposal.target_effects, actor, target);
    let checked = state_manager::validate(actor, &actor_effects).and_then(|actor_batch| {
        state_manager::validate(target, &target_effects).map(|target_batch| (actor_batch, target_batch))
    });
    let (actor_batch, target_batch) = match checked {
        Ok(batches) => batches,
        Err(e) => {
            debug!(actor = %actor.name, action = %draft.description, error = %e, "Outcome rejected, action fails");
            return Outcome {
                success: false,
                narrative: format!("{} cannot follow through on it.", actor.name),
                actor_effects: Vec::new(),
                target_effects: Vec::new(),
                dropped: vec![e],
            };
        }
    };

    let mut dropped = actor_batch.dropped;
    dropped.extend(target_batch.dropped);
    let mut outcome = Outcome {
        success: proposal.success,
        narrative: proposal.narrative,
        actor_effects: actor_batch.effects,
        target_effects: target_batch.effects,
        dropped,
    };
    if outcome.narrative.is_empty() {
        outcome.narrative = synthesize_narrative(&outcome, actor, target);
    }
    outcome
}

/// Factual one-line narration built from validated effects.
pub fn synthesize_narrative(outcome: &Outcome, actor: &Agent, target: &Agent) -> String {
    let mut clauses = Vec::new();
    for (agent, effects) in [(actor, &outcome.actor_effects), (target, &outcome.target_effects)] {
        for effect in effects {
            if let Some(clause) = effect_clause(effect) {
                clauses.push(format!("{} {clause}", agent.name));
            }
        }
    }
    if clauses.is_empty() {
        return FALLBACK_NARRATIVE.to_owned();
    }
    format!("{}.", clauses.join(", and "))
}

fn effect_clause(effect: &Effect) -> Option<String> {
    Some(match effect {
        Effect::AddCondition { condition } => format!("now has {condition}"),
        Effect::RemoveCondition { condition } => format!("recovers from {condition}"),
        Effect::Health { delta } if *delta < 0 => format!("loses {} health", delta.unsigned_abs()),
        Effect::Health { delta } => format!("regains {delta} health"),
        Effect::Gold { delta } if *delta < 0 => format!("pays {} gold", delta.unsigned_abs()),
        Effect::Gold { delta } => format!("receives {delta} gold"),
        Effect::AddItem { item, quantity } => format!("receives {quantity} {item}"),
        Effect::RemoveItem { item, quantity } => format!("hands over {quantity} {item}"),
        Effect::Relationship { .. } => return None,
    })
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Asks the oracle to resolve drafts and validates its answers.
#[derive(Clone)]
pub struct OutcomeResolver {
    client: Arc<OracleClient>,
    prompts: Arc<PromptEngine>,
    setting: StageSetting,
}

impl OutcomeResolver {
    /// Construct a resolver.
    pub const fn new(client: Arc<OracleClient>, prompts: Arc<PromptEngine>, setting: StageSetting) -> Self {
        Self {
            client,
            prompts,
            setting,
        }
    }

    /// Build the resolution request. Runs on the world thread.
    pub fn request_for(
        &self,
        draft: &ActionDraft,
        actor: &Agent,
        target: &Agent,
        transcript: &[TranscriptEntry],
    ) -> Result<OracleRequest, DialogueError> {
        Ok(OracleRequest {
            stage: Stage::Outcome,
            tier: self.setting.tier,
            prompt: self.prompts.outcome(draft, actor, target, transcript)?,
            max_tokens: self.setting.max_tokens,
        })
    }

    /// Send a prepared request and parse the proposal. Runs on a worker.
    pub async fn propose(
        &self,
        request: &OracleRequest,
        draft: &ActionDraft,
        cancel: &CancelFlag,
    ) -> Result<ProposedOutcome, OracleError> {
        let reply = self.client.send(request, cancel).await?;
        parse_outcome(&reply.text, draft)
    }

    /// Resolve `draft` end to end. Never fails; problems become a fizzle.
    pub async fn resolve(
        &self,
        draft: &ActionDraft,
        actor: &Agent,
        target: &Agent,
        transcript: &[TranscriptEntry],
        cancel: &CancelFlag,
    ) -> Outcome {
        let proposal = match self.request_for(draft, actor, target, transcript) {
            Ok(request) => self.propose(&request, draft, cancel).await,
            Err(e) => Err(OracleError::Config(e.to_string())),
        };
        finalize(proposal, draft, actor, target)
    }
}

impl std::fmt::Debug for OutcomeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeResolver")
            .field("setting", &self.setting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use hamlet_oracle::{BudgetConfig, Generation, RateBudget, RetryPolicy, TextOracle};
    use hamlet_types::{ModelTier, Personality};
    use rust_decimal_macros::dec;

    use super::*;

    fn agents() -> (Agent, Agent) {
        let baker = Agent::new("Mara", "baker", Personality::default())
            .with_gold(20)
            .with_item("bread", 2);
        let smith = Agent::new("Bram", "blacksmith", Personality::default()).with_gold(5);
        (baker, smith)
    }

    fn draft(actor: &Agent, target: &Agent) -> ActionDraft {
        ActionDraft {
            actor: actor.id,
            target: target.id,
            description: "Gives Bram a loaf".to_owned(),
            intent: "kindness".to_owned(),
            is_physical: false,
            ends_conversation: false,
        }
    }

    #[test]
    fn parse_full_outcome() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let raw = r#"{"success": true, "narrative": "Mara hands Bram a loaf.", "relationship_delta": 0.9,
            "actor_effects": {"health": 0, "gold": 0, "remove_items": [{"item": "bread", "quantity": 1}]},
            "target_effects": {"add_items": ["bread"], "gold": 0.0}}"#;
        let proposal = parse_outcome(raw, &d).unwrap();
        assert!(proposal.success);
        assert_eq!(
            proposal.actor_effects,
            vec![Effect::RemoveItem {
                item: "bread".to_owned(),
                quantity: 1
            }]
        );
        assert_eq!(
            proposal.target_effects,
            vec![
                Effect::AddItem {
                    item: "bread".to_owned(),
                    quantity: 1
                },
                Effect::Relationship {
                    toward: baker.id,
                    delta: dec!(0.5)
                },
            ]
        );
    }

    #[test]
    fn fractional_numbers_round() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let raw = r#"{"success": false, "actor_effects": {"health": -9.6, "add_condition": "null"}}"#;
        let proposal = parse_outcome(raw, &d).unwrap();
        assert_eq!(proposal.actor_effects, vec![Effect::Health { delta: -10 }]);
    }

    #[test]
    fn oracle_failure_fizzles() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let outcome = finalize(Err(OracleError::Timeout(std::time::Duration::from_secs(1))), &d, &baker, &smith);
        assert_eq!(outcome, Outcome::fallback());
        assert_eq!(outcome.narrative, FALLBACK_NARRATIVE);
        assert!(!outcome.has_effects());
    }

    #[test]
    fn giving_missing_item_downgrades_to_failure() {
        let (baker, smith) = agents();
        let d = ActionDraft {
            actor: smith.id,
            target: baker.id,
            ..draft(&smith, &baker)
        };
        let proposal = ProposedOutcome {
            success: true,
            narrative: "Bram hands over a horseshoe.".to_owned(),
            actor_effects: vec![Effect::RemoveItem {
                item: "horseshoe".to_owned(),
                quantity: 1,
            }],
            target_effects: vec![Effect::AddItem {
                item: "horseshoe".to_owned(),
                quantity: 1,
            }],
        };
        let outcome = finalize(Ok(proposal), &d, &smith, &baker);
        assert!(!outcome.success);
        assert!(!outcome.has_effects());
        assert_eq!(outcome.narrative, "Bram cannot follow through on it.");
        assert!(matches!(outcome.dropped.first(), Some(AgentError::MissingItem { .. })));
    }

    #[test]
    fn missing_narrative_is_synthesized() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let proposal = ProposedOutcome {
            success: true,
            narrative: String::new(),
            actor_effects: vec![Effect::Gold { delta: 5 }],
            target_effects: vec![Effect::Gold { delta: -5 }],
        };
        let outcome = finalize(Ok(proposal), &d, &baker, &smith);
        assert!(outcome.success);
        assert_eq!(outcome.narrative, "Mara receives 5 gold, and Bram pays 5 gold.");
    }

    #[test]
    fn invalid_single_effect_is_dropped() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let proposal = ProposedOutcome {
            success: true,
            narrative: "Mara laughs.".to_owned(),
            actor_effects: vec![Effect::RemoveCondition {
                condition: "sprained ankle".to_owned(),
            }],
            target_effects: Vec::new(),
        };
        let outcome = finalize(Ok(proposal), &d, &baker, &smith);
        assert!(outcome.success);
        assert!(!outcome.has_effects());
        assert_eq!(outcome.dropped.len(), 1);
    }

    #[test]
    fn one_sided_gift_is_taken_from_the_giver() {
        let (baker, smith) = agents();
        let d = ActionDraft {
            actor: smith.id,
            target: baker.id,
            ..draft(&smith, &baker)
        };
        // Only the receiving side is written; Bram owns no horseshoe.
        let raw = r#"{"success": true, "narrative": "Bram hands Mara a horseshoe.",
            "actor_effects": {"gold": 50}, "target_effects": {"add_items": ["horseshoe"]}}"#;
        let outcome = finalize(parse_outcome(raw, &d), &d, &smith, &baker);
        assert!(!outcome.success);
        assert!(!outcome.has_effects());
        assert!(matches!(outcome.dropped.first(), Some(AgentError::MissingItem { .. })));
    }

    #[test]
    fn one_sided_gift_the_giver_holds_goes_through() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let raw = r#"{"success": true, "narrative": "Mara hands Bram a loaf.",
            "target_effects": {"add_items": [{"item": "bread", "quantity": 1}]}}"#;
        let outcome = finalize(parse_outcome(raw, &d), &d, &baker, &smith);
        assert!(outcome.success);
        assert_eq!(
            outcome.actor_effects,
            vec![Effect::RemoveItem {
                item: "bread".to_owned(),
                quantity: 1
            }]
        );
        assert_eq!(
            outcome.target_effects,
            vec![Effect::AddItem {
                item: "bread".to_owned(),
                quantity: 1
            }]
        );
    }

    #[test]
    fn partial_removal_is_topped_up() {
        let (baker, smith) = agents();
        let (actor, target) = settle_transfers(
            vec![Effect::RemoveItem {
                item: "Bread".to_owned(),
                quantity: 1,
            }],
            vec![Effect::AddItem {
                item: "bread".to_owned(),
                quantity: 2,
            }],
            &baker,
            &smith,
        );
        assert_eq!(
            actor,
            vec![
                Effect::RemoveItem {
                    item: "Bread".to_owned(),
                    quantity: 1
                },
                Effect::RemoveItem {
                    item: "bread".to_owned(),
                    quantity: 1
                },
            ]
        );
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn gold_credit_is_paid_by_the_other_side() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        // Bram has 5 gold, so Mara cannot receive 50.
        let proposal = ProposedOutcome {
            success: true,
            narrative: "Bram pays up.".to_owned(),
            actor_effects: vec![Effect::Gold { delta: 50 }],
            target_effects: Vec::new(),
        };
        let outcome = finalize(Ok(proposal), &d, &baker, &smith);
        assert!(outcome.success);
        assert_eq!(outcome.actor_effects, vec![Effect::Gold { delta: 5 }]);
        assert_eq!(outcome.target_effects, vec![Effect::Gold { delta: -5 }]);
    }

    #[test]
    fn gold_settlement_rules() {
        // Matching debit and credit.
        assert_eq!(fund_gold(5, -5, 20, 10), (5, -5));
        // Credit capped by the payer's purse.
        assert_eq!(fund_gold(0, 30, 12, 0), (-12, 12));
        // A larger stated debit still stands.
        assert_eq!(fund_gold(3, -8, 0, 10), (3, -8));
        // Credits on both sides net out.
        assert_eq!(fund_gold(10, 4, 0, 100), (6, -6));
        assert_eq!(fund_gold(4, 4, 0, 0), (0, 0));
        // Plain losses are left to validation.
        assert_eq!(fund_gold(-7, 0, 3, 3), (-7, 0));
    }

    #[test]
    fn consumption_needs_no_receiver() {
        let (baker, smith) = agents();
        let (actor, target) = settle_transfers(
            vec![Effect::RemoveItem {
                item: "bread".to_owned(),
                quantity: 1,
            }],
            Vec::new(),
            &baker,
            &smith,
        );
        assert_eq!(actor.len(), 1);
        assert!(target.is_empty());
    }

    /// Answers every prompt with the same text.
    struct Canned(&'static str);

    #[async_trait]
    impl TextOracle for Canned {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<Generation, OracleError> {
            Ok(Generation {
                text: self.0.to_owned(),
                tokens_used: Some(40),
            })
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn resolver(reply: &'static str) -> OutcomeResolver {
        let client = OracleClient::new(
            Arc::new(Canned(reply)),
            None,
            Arc::new(RateBudget::new(BudgetConfig::default())),
            Duration::from_secs(5),
            RetryPolicy {
                jitter_max: Duration::ZERO,
                ..RetryPolicy::default()
            },
        );
        OutcomeResolver::new(
            Arc::new(client),
            Arc::new(PromptEngine::with_defaults().unwrap()),
            StageSetting::new(ModelTier::Fast, 300),
        )
    }

    #[tokio::test]
    async fn resolve_validates_the_oracle_answer() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let reply = r#"Sure: {"success": true, "narrative": "Mara hands Bram a loaf.",
            "relationship_delta": 0.2, "target_effects": {"add_items": ["bread"]}}"#;
        let outcome = resolver(reply)
            .resolve(&d, &baker, &smith, &[], &CancelFlag::new())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.narrative, "Mara hands Bram a loaf.");
        assert_eq!(
            outcome.actor_effects,
            vec![Effect::RemoveItem {
                item: "bread".to_owned(),
                quantity: 1
            }]
        );
        assert!(outcome.target_effects.contains(&Effect::Relationship {
            toward: baker.id,
            delta: dec!(0.2)
        }));
    }

    #[tokio::test]
    async fn resolve_fizzles_on_garbage() {
        let (baker, smith) = agents();
        let d = draft(&baker, &smith);
        let outcome = resolver("I'd rather not say.")
            .resolve(&d, &baker, &smith, &[], &CancelFlag::new())
            .await;
        assert_eq!(outcome, Outcome::fallback());
    }
}
