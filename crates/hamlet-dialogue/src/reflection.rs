//! End-of-conversation reflection.
//!
//! Each participant privately sums up the conversation. The reply is a
//! short line-oriented format rather than JSON:
//!
//! ```text
//! SUMMARY: Mara gave me bread and asked after my forge.
//! FEELING: 0.2
//! OBSERVATION: She worries about the harvest.
//! ```
//!
//! The summary goes into relationship history, the observation into notes,
//! and the feeling (clamped to +/-0.3) into the feeling score.

use std::str::FromStr;
use std::sync::Arc;

use hamlet_agents::Agent;
use hamlet_oracle::{CancelFlag, OracleClient, OracleError, OracleRequest};
use hamlet_types::{AgentId, SimTime, Stage};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::StageSetting;
use crate::error::DialogueError;
use crate::prompt::PromptEngine;
use crate::session::TranscriptEntry;

/// Largest feeling change a single reflection can make.
pub const MAX_REFLECTION_DELTA: Decimal = Decimal::from_parts(3, 0, 0, false, 1);

/// Summary recorded when the reflection could not be obtained.
pub const FALLBACK_SUMMARY: &str = "Had a conversation";

/// Feeling change applied with [`FALLBACK_SUMMARY`].
pub const FALLBACK_FEELING: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

const EMPTY_OBSERVATIONS: [&str; 4] = ["nothing notable", "nothing", "none", "n/a"];

/// One participant's reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    /// One-sentence summary for relationship history.
    pub summary: String,
    /// Feeling change, within `[-0.3, 0.3]`.
    pub feeling_delta: Decimal,
    /// Something worth remembering about the other agent.
    pub observation: Option<String>,
}

impl Reflection {
    /// The reflection used when the oracle could not be consulted.
    pub fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_owned(),
            feeling_delta: FALLBACK_FEELING,
            observation: None,
        }
    }
}

/// Parse a `SUMMARY:` / `FEELING:` / `OBSERVATION:` reply.
///
/// Labels are case-insensitive and may appear in any order. A missing or
/// unreadable feeling counts as zero. A missing summary is malformed.
pub fn parse_reflection(raw: &str) -> Result<Reflection, OracleError> {
    let mut summary = None;
    let mut feeling = Decimal::ZERO;
    let mut observation = None;

    for line in raw.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim();
        match label.trim().to_ascii_uppercase().as_str() {
            "SUMMARY" if !value.is_empty() => summary = Some(value.to_owned()),
            "FEELING" => feeling = parse_feeling(value),
            "OBSERVATION" if !is_empty_observation(value) => observation = Some(value.to_owned()),
            _ => {}
        }
    }

    let summary = summary.ok_or_else(|| {
        OracleError::MalformedResponse(format!(
            "reflection has no SUMMARY line: {}",
            hamlet_oracle::parse::truncate(raw, 120)
        ))
    })?;
    Ok(Reflection {
        summary,
        feeling_delta: feeling.clamp(-MAX_REFLECTION_DELTA, MAX_REFLECTION_DELTA),
        observation,
    })
}

fn parse_feeling(value: &str) -> Decimal {
    let number: String = value
        .trim_start_matches('+')
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    Decimal::from_str(&number).unwrap_or(Decimal::ZERO)
}

fn is_empty_observation(value: &str) -> bool {
    let bare = value.trim_end_matches('.').trim();
    bare.is_empty() || EMPTY_OBSERVATIONS.iter().any(|e| bare.eq_ignore_ascii_case(e))
}

/// Write a reflection into `agent`'s relationship with `other`.
///
/// Returns the new feeling score.
pub fn apply_reflection(agent: &mut Agent, other: AgentId, reflection: &Reflection, now: SimTime) -> Decimal {
    let relationship = agent.relationship_mut(other);
    relationship.record_interaction(&reflection.summary, now);
    if let Some(note) = &reflection.observation {
        relationship.add_note(note);
    }
    relationship.adjust_feeling(reflection.feeling_delta, now)
}

/// Asks the oracle for reflections.
#[derive(Clone)]
pub struct Reflector {
    client: Arc<OracleClient>,
    prompts: Arc<PromptEngine>,
    setting: StageSetting,
}

impl Reflector {
    /// Construct a reflector.
    pub const fn new(client: Arc<OracleClient>, prompts: Arc<PromptEngine>, setting: StageSetting) -> Self {
        Self {
            client,
            prompts,
            setting,
        }
    }

    /// Build the reflection request for `agent`. Runs on the world thread.
    pub fn request_for(
        &self,
        agent: &Agent,
        other: &Agent,
        transcript: &[TranscriptEntry],
    ) -> Result<OracleRequest, DialogueError> {
        Ok(OracleRequest {
            stage: Stage::Reflection,
            tier: self.setting.tier,
            prompt: self.prompts.reflection(agent, other, transcript)?,
            max_tokens: self.setting.max_tokens,
        })
    }

    /// Send a prepared request and parse the reply. Runs on a worker.
    pub async fn reflect(&self, request: &OracleRequest, cancel: &CancelFlag) -> Result<Reflection, OracleError> {
        let reply = self.client.send(request, cancel).await?;
        let reflection = parse_reflection(&reply.text);
        if let Err(e) = &reflection {
            debug!(error = %e, "Reflection reply unreadable");
        }
        reflection
    }
}

impl std::fmt::Debug for Reflector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reflector")
            .field("setting", &self.setting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use hamlet_types::Personality;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parses_well_formed_reply() {
        let raw = "SUMMARY: Mara gave me bread.\nFEELING: 0.2\nOBSERVATION: She worries about the harvest.";
        assert_eq!(
            parse_reflection(raw).ok(),
            Some(Reflection {
                summary: "Mara gave me bread.".to_owned(),
                feeling_delta: dec!(0.2),
                observation: Some("She worries about the harvest.".to_owned()),
            })
        );
    }

    #[test]
    fn feeling_is_clamped_and_lenient() {
        let raw = "summary: We argued.\nFeeling: -0.9 (quite upset)\nObservation: nothing notable";
        let reflection = parse_reflection(raw).ok();
        assert_eq!(reflection.as_ref().map(|r| r.feeling_delta), Some(dec!(-0.3)));
        assert_eq!(reflection.and_then(|r| r.observation), None);

        let plus = parse_reflection("SUMMARY: Fine.\nFEELING: +0.1").ok();
        assert_eq!(plus.map(|r| r.feeling_delta), Some(dec!(0.1)));
    }

    #[test]
    fn missing_feeling_is_zero() {
        let reflection = parse_reflection("SUMMARY: Small talk.").ok();
        assert_eq!(reflection.map(|r| r.feeling_delta), Some(Decimal::ZERO));
    }

    #[test]
    fn missing_summary_is_malformed() {
        assert!(matches!(
            parse_reflection("FEELING: 0.1"),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn apply_updates_relationship() {
        let other = AgentId::new();
        let mut agent = Agent::new("Bram", "blacksmith", Personality::default());
        let reflection = Reflection {
            summary: "Mara gave me bread.".to_owned(),
            feeling_delta: dec!(0.2),
            observation: Some("Kind".to_owned()),
        };
        let score = apply_reflection(&mut agent, other, &reflection, SimTime::from_hours(1));
        assert_eq!(score, dec!(0.2));

        let rel = agent.relationship(other);
        assert_eq!(rel.map(hamlet_agents::Relationship::interaction_count), Some(1));
        assert_eq!(
            rel.and_then(|r| r.history().next()),
            Some("Mara gave me bread.")
        );
        assert_eq!(rel.and_then(|r| r.notes().next()), Some("Kind"));
    }

    #[test]
    fn fallback_is_mildly_positive() {
        let fallback = Reflection::fallback();
        assert_eq!(fallback.summary, "Had a conversation");
        assert_eq!(fallback.feeling_delta, dec!(0.05));
        assert!(fallback.observation.is_none());
    }
}
