//! Prompt template loading and rendering via `minijinja`.
//!
//! One template per oracle-backed stage. Defaults are compiled in from
//! `templates/`; an operator can override any of them by dropping a file of
//! the same name (`dialogue.j2`, `action.j2`, `outcome.j2`, `reflection.j2`)
//! into a directory and pointing [`PromptEngine::from_dir`] at it.

use std::path::Path;

use hamlet_agents::Agent;
use hamlet_types::Stage;
use minijinja::Environment;
use serde_json::{Value, json};
use tracing::info;

use crate::error::DialogueError;
use crate::interpreter::ActionDraft;
use crate::session::TranscriptEntry;

/// Transcript entries shown to the model; older lines are dropped.
pub const RECENT_ENTRIES: usize = 12;

const DEFAULT_TEMPLATES: [(Stage, &str); 4] = [
    (Stage::Dialogue, include_str!("../templates/dialogue.j2")),
    (Stage::Action, include_str!("../templates/action.j2")),
    (Stage::Outcome, include_str!("../templates/outcome.j2")),
    (Stage::Reflection, include_str!("../templates/reflection.j2")),
];

/// Renders the prompt for each pipeline stage.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEngine").finish_non_exhaustive()
    }
}

impl PromptEngine {
    /// Engine with the compiled-in templates.
    pub fn with_defaults() -> Result<Self, DialogueError> {
        let mut env = Environment::new();
        for (stage, source) in DEFAULT_TEMPLATES {
            add_template(&mut env, stage, source.to_owned())?;
        }
        Ok(Self { env })
    }

    /// Engine whose templates are read from `dir` where present.
    ///
    /// Missing files fall back to the compiled-in default for that stage.
    pub fn from_dir(dir: &Path) -> Result<Self, DialogueError> {
        let mut env = Environment::new();
        for (stage, default) in DEFAULT_TEMPLATES {
            let path = dir.join(format!("{}.j2", stage.as_str()));
            let source = if path.is_file() {
                info!(stage = %stage, path = %path.display(), "Using template override");
                std::fs::read_to_string(&path).map_err(|e| {
                    DialogueError::Template(format!("failed to read {}: {e}", path.display()))
                })?
            } else {
                default.to_owned()
            };
            add_template(&mut env, stage, source)?;
        }
        Ok(Self { env })
    }

    /// Render the template for `stage` against an arbitrary context.
    pub fn render(&self, stage: Stage, context: &Value) -> Result<String, DialogueError> {
        self.env
            .get_template(stage.as_str())
            .map_err(|e| DialogueError::Template(format!("missing {stage} template: {e}")))?
            .render(context)
            .map_err(|e| DialogueError::Template(format!("{stage} render failed: {e}")))
    }

    /// Prompt for the next line spoken by `speaker`.
    pub fn dialogue(
        &self,
        speaker: &Agent,
        listener: &Agent,
        transcript: &[TranscriptEntry],
        turns_taken: u32,
        max_turns: u32,
    ) -> Result<String, DialogueError> {
        let context = json!({
            "speaker": agent_view(speaker),
            "listener": agent_view(listener),
            "relationship": relationship_view(speaker, listener),
            "transcript": transcript_view(transcript),
            "phase_hint": phase_hint(turns_taken, max_turns, transcript.is_empty()),
        });
        self.render(Stage::Dialogue, &context)
    }

    /// Prompt asking whether `line` contains an action.
    pub fn action(
        &self,
        actor: &Agent,
        target: &Agent,
        line: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<String, DialogueError> {
        let context = json!({
            "actor": agent_view(actor),
            "target": agent_view(target),
            "line": line,
            "transcript": transcript_view(transcript),
        });
        self.render(Stage::Action, &context)
    }

    /// Prompt asking what an extracted action changes.
    pub fn outcome(
        &self,
        draft: &ActionDraft,
        actor: &Agent,
        target: &Agent,
        transcript: &[TranscriptEntry],
    ) -> Result<String, DialogueError> {
        let context = json!({
            "action": {
                "description": draft.description,
                "intent": draft.intent,
                "is_physical": draft.is_physical,
            },
            "actor": agent_view(actor),
            "target": agent_view(target),
            "transcript": transcript_view(transcript),
        });
        self.render(Stage::Outcome, &context)
    }

    /// Prompt for `agent`'s private reflection on a finished conversation.
    pub fn reflection(
        &self,
        agent: &Agent,
        other: &Agent,
        transcript: &[TranscriptEntry],
    ) -> Result<String, DialogueError> {
        let context = json!({
            "agent": agent_view(agent),
            "other": agent_view(other),
            "relationship": relationship_view(agent, other),
            "transcript": transcript_view(transcript),
        });
        self.render(Stage::Reflection, &context)
    }
}

fn add_template(
    env: &mut Environment<'static>,
    stage: Stage,
    source: String,
) -> Result<(), DialogueError> {
    env.add_template_owned(stage.as_str(), source)
        .map_err(|e| DialogueError::Template(format!("failed to add {stage} template: {e}")))
}

// ---------------------------------------------------------------------------
// Context views
// ---------------------------------------------------------------------------

fn agent_view(agent: &Agent) -> Value {
    json!({
        "name": agent.name,
        "role": agent.role,
        "speech_style": agent.speech_style,
        "personality": agent.personality.describe(),
        "health": agent.state.health,
        "max_health": agent.state.max_health,
        "conditions": agent.state.health_conditions,
        "gold": agent.gold,
        "inventory": agent.inventory.describe(),
    })
}

fn relationship_view(agent: &Agent, other: &Agent) -> Value {
    agent.relationship(other.id).map_or_else(
        || json!({ "label": "a stranger", "interactions": 0, "history": [], "notes": [] }),
        |rel| {
            json!({
                "label": rel.label(),
                "interactions": rel.interaction_count(),
                "history": rel.history().collect::<Vec<_>>(),
                "notes": rel.notes().collect::<Vec<_>>(),
            })
        },
    )
}

fn transcript_view(transcript: &[TranscriptEntry]) -> Vec<Value> {
    let start = transcript.len().saturating_sub(RECENT_ENTRIES);
    transcript
        .get(start..)
        .unwrap_or_default()
        .iter()
        .map(|entry| json!({ "speaker": entry.label(), "text": entry.text }))
        .collect()
}

/// Steering sentence for where the speaker is in the conversation.
pub const fn phase_hint(turns_taken: u32, max_turns: u32, opening: bool) -> &'static str {
    if opening {
        "Open the conversation with a greeting that fits how you feel about them."
    } else if turns_taken.saturating_add(1) >= max_turns {
        "This is your last line. Bring the conversation to a natural close."
    } else if turns_taken.saturating_mul(2) >= max_turns {
        "The conversation is well under way. Move it toward whatever you came to say."
    } else {
        "Keep the conversation going naturally."
    }
}
