//! Turning spoken lines into structured actions.
//!
//! Most lines are plain speech. A cheap local scan decides whether a line
//! could describe an action at all; only lines that pass it cost an oracle
//! call. The oracle then returns a structured [`ActionDraft`] or says there
//! is nothing to act on.

use std::sync::Arc;

use hamlet_agents::Agent;
use hamlet_oracle::{CancelFlag, OracleClient, OracleError, OracleRequest, parse_json};
use hamlet_types::{AgentId, Stage};
use serde::Deserialize;
use tracing::debug;

use crate::config::StageSetting;
use crate::error::DialogueError;
use crate::prompt::PromptEngine;
use crate::session::TranscriptEntry;

// ---------------------------------------------------------------------------
// Marker scan
// ---------------------------------------------------------------------------

/// Local, oracle-free test for whether a line might contain an action.
pub trait MarkerScan: Send + Sync {
    /// `true` if the line should be sent for action extraction.
    fn has_action(&self, line: &str) -> bool;
}

impl<F> MarkerScan for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn has_action(&self, line: &str) -> bool {
        self(line)
    }
}

/// Treats text between a pair of asterisks as a described action,
/// e.g. `*hands over the bread*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmphasisMarkers;

impl MarkerScan for EmphasisMarkers {
    fn has_action(&self, line: &str) -> bool {
        let mut spans = line.split('*');
        // Odd-indexed pieces sit between a pair of asterisks.
        spans.next();
        while let Some(inside) = spans.next() {
            if spans.clone().next().is_none() {
                // Unpaired trailing asterisk.
                return false;
            }
            if !inside.trim().is_empty() {
                return true;
            }
            spans.next();
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// A structured action extracted from a line, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDraft {
    /// The agent performing it (the speaker).
    pub actor: AgentId,
    /// The agent it is aimed at (the listener).
    pub target: AgentId,
    /// What the actor does.
    pub description: String,
    /// Why, as far as the oracle can tell.
    pub intent: String,
    /// Whether the action involves bodily contact or force.
    pub is_physical: bool,
    /// Whether the action ends the conversation (walking away, a blow).
    pub ends_conversation: bool,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_detected: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    is_physical: bool,
    #[serde(default)]
    ends_conversation: bool,
}

/// Parse the oracle's extraction reply.
///
/// `action_detected: false` and an empty description both mean no action.
pub fn parse_action(raw: &str, actor: AgentId, target: AgentId) -> Result<Option<ActionDraft>, OracleError> {
    let parsed: RawAction = parse_json(raw)?;
    let description = parsed.description.trim();
    if !parsed.action_detected || description.is_empty() {
        return Ok(None);
    }
    Ok(Some(ActionDraft {
        actor,
        target,
        description: description.to_owned(),
        intent: parsed.intent.trim().to_owned(),
        is_physical: parsed.is_physical,
        ends_conversation: parsed.ends_conversation,
    }))
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Scans lines and, when warranted, asks the oracle for an [`ActionDraft`].
#[derive(Clone)]
pub struct ActionInterpreter {
    client: Arc<OracleClient>,
    prompts: Arc<PromptEngine>,
    scan: Arc<dyn MarkerScan>,
    setting: StageSetting,
}

impl ActionInterpreter {
    /// Interpreter using [`EmphasisMarkers`].
    pub fn new(client: Arc<OracleClient>, prompts: Arc<PromptEngine>, setting: StageSetting) -> Self {
        Self {
            client,
            prompts,
            scan: Arc::new(EmphasisMarkers),
            setting,
        }
    }

    /// Replace the local marker scan.
    #[must_use]
    pub fn with_marker_scan(mut self, scan: Arc<dyn MarkerScan>) -> Self {
        self.scan = scan;
        self
    }

    /// Run the local scan. Never calls the oracle.
    pub fn has_markers(&self, line: &str) -> bool {
        self.scan.has_action(line)
    }

    /// Build the extraction request for `line`. Runs on the world thread.
    pub fn request_for(
        &self,
        actor: &Agent,
        target: &Agent,
        line: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<OracleRequest, DialogueError> {
        Ok(OracleRequest {
            stage: Stage::Action,
            tier: self.setting.tier,
            prompt: self.prompts.action(actor, target, line, transcript)?,
            max_tokens: self.setting.max_tokens,
        })
    }

    /// Send a prepared request and parse the reply. Runs on a worker.
    pub async fn request(
        &self,
        request: &OracleRequest,
        actor: AgentId,
        target: AgentId,
        cancel: &CancelFlag,
    ) -> Result<Option<ActionDraft>, OracleError> {
        let reply = self.client.send(request, cancel).await?;
        parse_action(&reply.text, actor, target)
    }

    /// Extract an action from `line`, or `None`.
    ///
    /// Lines without markers return `None` without touching the oracle.
    /// Oracle failures are logged and also yield `None`.
    pub async fn extract(
        &self,
        line: &str,
        actor: &Agent,
        target: &Agent,
        transcript: &[TranscriptEntry],
        cancel: &CancelFlag,
    ) -> Option<ActionDraft> {
        if !self.has_markers(line) {
            return None;
        }
        let request = match self.request_for(actor, target, line, transcript) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Action prompt failed to render");
                return None;
            }
        };
        match self.request(&request, actor.id, target.id, cancel).await {
            Ok(draft) => draft,
            Err(e) => {
                debug!(error = %e, "Action extraction failed, treating line as speech");
                None
            }
        }
    }
}

impl std::fmt::Debug for ActionInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInterpreter")
            .field("setting", &self.setting)
            .finish_non_exhaustive()
    }
}
