//! One conversation between two agents.
//!
//! A session is a small state machine. It is only ever touched by the
//! world thread; workers never see it. At most one oracle request is in
//! flight per session, tracked by [`PendingRequest`], and a completion is
//! only accepted if it carries that request's ID.
//!
//! ```text
//! Idle -> Initiated -> AwaitingDialogue -> ActionCheck --(no action)--> Initiated
//!                                              |                            |
//!                                              v                            v
//!                                      AwaitingOutcome -> EffectsApplied  Concluding
//!                                                              |            |
//!                                                              +----> AwaitingReflection -> Closed
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use hamlet_oracle::CancelFlag;
use hamlet_types::{AgentId, RequestId, SessionId, SimTime, Stage};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::DialogueError;
use crate::interpreter::ActionDraft;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, nothing requested yet.
    Idle,
    /// Ready to request the next line.
    Initiated,
    /// Waiting for the current speaker's line.
    AwaitingDialogue,
    /// Line received; deciding whether it holds an action.
    ActionCheck,
    /// Waiting for an action outcome.
    AwaitingOutcome,
    /// Outcome applied to both agents.
    EffectsApplied,
    /// Turn cap reached or the action ended the talk.
    Concluding,
    /// Waiting for a participant's reflection.
    AwaitingReflection,
    /// Finished. Terminal.
    Closed,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            ActionCheck, AwaitingDialogue, AwaitingOutcome, AwaitingReflection, Closed, Concluding,
            EffectsApplied, Idle, Initiated,
        };
        matches!(
            (self, next),
            (Idle, Initiated)
                | (Initiated, AwaitingDialogue | Concluding)
                | (AwaitingDialogue, ActionCheck)
                | (ActionCheck, AwaitingOutcome | Initiated | Concluding)
                | (AwaitingOutcome, EffectsApplied)
                | (EffectsApplied, Initiated | Concluding)
                | (Concluding | AwaitingReflection, AwaitingReflection | Closed)
        )
    }

    /// Whether the session is finished.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Kind of transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Something a participant said.
    Line,
    /// Narration of a resolved action.
    Narration,
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who spoke; `None` for narration.
    pub speaker: Option<AgentId>,
    /// Speaker display name at the time.
    pub speaker_name: String,
    /// The text.
    pub text: String,
    /// Line or narration.
    pub kind: EntryKind,
}

impl TranscriptEntry {
    /// Label shown before the text in prompts.
    pub fn label(&self) -> &str {
        match self.kind {
            EntryKind::Line => &self.speaker_name,
            EntryKind::Narration => "Narrator",
        }
    }
}

// ---------------------------------------------------------------------------
// Pending request
// ---------------------------------------------------------------------------

/// The single oracle request a session is waiting on.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Matches the completion that answers it.
    pub request_id: RequestId,
    /// Stage being run.
    pub stage: Stage,
    /// Agent the stage runs for.
    pub speaker: Option<AgentId>,
    /// Short description for stage records.
    pub input_summary: String,
    /// Wall-clock submission time.
    pub submitted_at: Instant,
    /// Shared with the worker running the request.
    pub cancel: CancelFlag,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A conversation between two agents.
#[derive(Debug)]
pub struct ConversationSession {
    id: SessionId,
    initiator: AgentId,
    responder: AgentId,
    state: SessionState,
    turn_index: u32,
    initiator_turns: u32,
    responder_turns: u32,
    max_turns_per_participant: u32,
    transcript: Vec<TranscriptEntry>,
    pending: Option<PendingRequest>,
    draft: Option<ActionDraft>,
    reflections_due: VecDeque<AgentId>,
    started_at: SimTime,
}

impl ConversationSession {
    /// A new session in [`SessionState::Idle`]. The initiator speaks first.
    pub fn new(initiator: AgentId, responder: AgentId, max_turns_per_participant: u32, now: SimTime) -> Self {
        Self {
            id: SessionId::new(),
            initiator,
            responder,
            state: SessionState::Idle,
            turn_index: 0,
            initiator_turns: 0,
            responder_turns: 0,
            max_turns_per_participant,
            transcript: Vec::new(),
            pending: None,
            draft: None,
            reflections_due: VecDeque::new(),
            started_at: now,
        }
    }

    /// Session ID.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Both participants, initiator first.
    pub const fn participants(&self) -> (AgentId, AgentId) {
        (self.initiator, self.responder)
    }

    /// Whether `agent` takes part in this session.
    pub fn involves(&self, agent: AgentId) -> bool {
        self.initiator == agent || self.responder == agent
    }

    /// The other participant.
    pub fn partner_of(&self, agent: AgentId) -> AgentId {
        if agent == self.initiator {
            self.responder
        } else {
            self.initiator
        }
    }

    /// Whose line comes next (or came last, while it is being processed).
    pub const fn current_speaker(&self) -> AgentId {
        if self.turn_index % 2 == 0 {
            self.initiator
        } else {
            self.responder
        }
    }

    /// The participant listening to the current speaker.
    pub const fn current_listener(&self) -> AgentId {
        if self.turn_index % 2 == 0 {
            self.responder
        } else {
            self.initiator
        }
    }

    /// Lines `agent` has spoken so far.
    pub fn turns_taken(&self, agent: AgentId) -> u32 {
        if agent == self.initiator {
            self.initiator_turns
        } else if agent == self.responder {
            self.responder_turns
        } else {
            0
        }
    }

    /// Lines spoken by both participants.
    pub const fn total_turns(&self) -> u32 {
        self.initiator_turns.saturating_add(self.responder_turns)
    }

    /// Per-participant line cap.
    pub const fn max_turns_per_participant(&self) -> u32 {
        self.max_turns_per_participant
    }

    /// Whether the turn cap has been reached.
    ///
    /// Lines strictly alternate, so the participant due to speak next is
    /// known from the counts alone. The session ends once that participant
    /// has used their lines, which gives each side exactly the cap.
    pub const fn should_conclude(&self) -> bool {
        let total = self.total_turns();
        let next_speaker_turns = if total % 2 == 0 {
            self.initiator_turns
        } else {
            self.responder_turns
        };
        next_speaker_turns >= self.max_turns_per_participant
            || total >= self.max_turns_per_participant.saturating_mul(2)
    }

    /// The transcript so far.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Simulated time the session started.
    pub const fn started_at(&self) -> SimTime {
        self.started_at
    }

    /// Move to `next`, refusing transitions the state machine forbids.
    ///
    /// An illegal transition is a bug in the caller; debug builds panic.
    pub fn transition(&mut self, next: SessionState) -> Result<(), DialogueError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            return Ok(());
        }
        error!(session_id = %self.id, from = ?self.state, to = ?next, "Illegal session transition");
        debug_assert!(false, "illegal session transition {:?} -> {next:?}", self.state);
        Err(DialogueError::InvalidTransition {
            session_id: self.id,
            from: self.state,
            to: next,
        })
    }

    /// Close immediately, from any state, cancelling anything in flight.
    pub fn abort(&mut self) {
        self.cancel_pending();
        self.reflections_due.clear();
        self.draft = None;
        self.state = SessionState::Closed;
    }

    // -- requests --

    /// Register a new in-flight request.
    ///
    /// Fails if one is already in flight; debug builds panic.
    pub fn begin_request(
        &mut self,
        stage: Stage,
        speaker: Option<AgentId>,
        input_summary: String,
    ) -> Result<PendingRequest, DialogueError> {
        if let Some(existing) = &self.pending {
            error!(
                session_id = %self.id,
                in_flight = %existing.stage,
                requested = %stage,
                "Second oracle request for one session"
            );
            debug_assert!(false, "session {} already has a request in flight", self.id);
            return Err(DialogueError::RequestInFlight(self.id));
        }
        let pending = PendingRequest {
            request_id: RequestId::new(),
            stage,
            speaker,
            input_summary,
            submitted_at: Instant::now(),
            cancel: CancelFlag::new(),
        };
        self.pending = Some(pending.clone());
        Ok(pending)
    }

    /// The request in flight, if any.
    pub const fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Claim the in-flight request if `request_id` matches it.
    pub fn take_pending(&mut self, request_id: RequestId) -> Option<PendingRequest> {
        if self.pending.as_ref().is_some_and(|p| p.request_id == request_id) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Cancel and forget the in-flight request. Returns whether there was one.
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some_and(|pending| {
            pending.cancel.cancel();
            true
        })
    }

    // -- transcript --

    /// Append the current speaker's line and count the turn.
    pub fn record_line(&mut self, speaker_name: &str, text: String) {
        let speaker = self.current_speaker();
        if speaker == self.initiator {
            self.initiator_turns = self.initiator_turns.saturating_add(1);
        } else {
            self.responder_turns = self.responder_turns.saturating_add(1);
        }
        self.transcript.push(TranscriptEntry {
            speaker: Some(speaker),
            speaker_name: speaker_name.to_owned(),
            text,
            kind: EntryKind::Line,
        });
    }

    /// Append narration. Does not count as a turn.
    pub fn record_narration(&mut self, text: String) {
        self.transcript.push(TranscriptEntry {
            speaker: None,
            speaker_name: String::new(),
            text,
            kind: EntryKind::Narration,
        });
    }

    /// Hand the floor to the other participant.
    pub const fn advance_turn(&mut self) {
        self.turn_index = self.turn_index.saturating_add(1);
    }

    // -- actions --

    /// Hold the draft being resolved.
    pub fn set_draft(&mut self, draft: ActionDraft) {
        self.draft = Some(draft);
    }

    /// Release the draft being resolved.
    pub const fn take_draft(&mut self) -> Option<ActionDraft> {
        self.draft.take()
    }

    // -- reflections --

    /// Queue a reflection for each participant, initiator first.
    pub fn queue_reflections(&mut self) {
        self.reflections_due.clear();
        self.reflections_due.push_back(self.initiator);
        self.reflections_due.push_back(self.responder);
    }

    /// The participant whose reflection is next.
    pub fn next_reflection(&self) -> Option<AgentId> {
        self.reflections_due.front().copied()
    }

    /// Mark the front reflection done.
    pub fn complete_reflection(&mut self) -> Option<AgentId> {
        self.reflections_due.pop_front()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(max_turns: u32) -> (ConversationSession, AgentId, AgentId) {
        let a = AgentId::new();
        let b = AgentId::new();
        (ConversationSession::new(a, b, max_turns, SimTime::ZERO), a, b)
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        let (mut s, _, _) = session(2);
        for next in [
            SessionState::Initiated,
            SessionState::AwaitingDialogue,
            SessionState::ActionCheck,
            SessionState::AwaitingOutcome,
            SessionState::EffectsApplied,
            SessionState::Initiated,
            SessionState::AwaitingDialogue,
            SessionState::ActionCheck,
            SessionState::Concluding,
            SessionState::AwaitingReflection,
            SessionState::AwaitingReflection,
            SessionState::Closed,
        ] {
            assert!(s.transition(next).is_ok(), "transition to {next:?} should be allowed");
        }
        assert!(s.state().is_closed());
    }

    #[test]
    fn closed_is_terminal() {
        for next in [
            SessionState::Idle,
            SessionState::Initiated,
            SessionState::AwaitingDialogue,
            SessionState::Concluding,
            SessionState::Closed,
        ] {
            assert!(!SessionState::Closed.can_transition_to(next));
        }
        assert!(!SessionState::Idle.can_transition_to(SessionState::AwaitingOutcome));
        assert!(!SessionState::AwaitingDialogue.can_transition_to(SessionState::Closed));
    }

    #[test]
    fn speakers_alternate() {
        let (mut s, a, b) = session(3);
        assert_eq!(s.current_speaker(), a);
        assert_eq!(s.current_listener(), b);
        s.record_line("A", "Hello".to_owned());
        s.advance_turn();
        assert_eq!(s.current_speaker(), b);
        s.record_line("B", "Hi".to_owned());
        assert_eq!(s.turns_taken(a), 1);
        assert_eq!(s.turns_taken(b), 1);
        assert_eq!(s.partner_of(a), b);
        assert!(s.involves(b));
    }

    #[test]
    fn concludes_at_turn_cap() {
        let (mut s, _, _) = session(2);
        for i in 0..4 {
            assert!(!s.should_conclude());
            s.record_line("X", format!("line {i}"));
            s.advance_turn();
        }
        assert!(s.should_conclude());
        assert_eq!(s.total_turns(), 4);
    }

    #[test]
    fn responder_gets_the_last_line() {
        let (mut s, a, b) = session(1);
        s.record_line("A", "Morning.".to_owned());
        assert!(!s.should_conclude(), "responder has not spoken yet");
        s.advance_turn();
        s.record_line("B", "Morning to you.".to_owned());
        assert!(s.should_conclude());
        assert_eq!(s.turns_taken(a), 1);
        assert_eq!(s.turns_taken(b), 1);
    }

    #[test]
    fn narration_does_not_count() {
        let (mut s, a, _) = session(1);
        s.record_narration("Mara hands over a loaf.".to_owned());
        assert_eq!(s.turns_taken(a), 0);
        assert_eq!(s.transcript().first().map(TranscriptEntry::label), Some("Narrator"));
    }

    #[test]
    fn pending_request_matches_by_id() {
        let (mut s, a, _) = session(2);
        let pending = s.begin_request(Stage::Dialogue, Some(a), "turn 1".to_owned()).unwrap();
        assert!(s.take_pending(RequestId::new()).is_none());
        assert!(s.pending().is_some());
        assert!(s.take_pending(pending.request_id).is_some());
        assert!(s.pending().is_none());
    }

    #[test]
    fn cancel_pending_sets_flag() {
        let (mut s, _, _) = session(2);
        let pending = s.begin_request(Stage::Reflection, None, String::new()).unwrap();
        assert!(s.cancel_pending());
        assert!(pending.cancel.is_cancelled());
        assert!(!s.cancel_pending());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already has a request in flight")]
    fn second_request_panics_in_debug() {
        let (mut s, _, _) = session(2);
        let _first = s.begin_request(Stage::Dialogue, None, String::new());
        let _second = s.begin_request(Stage::Dialogue, None, String::new());
    }

    #[test]
    fn reflections_run_in_order() {
        let (mut s, a, b) = session(2);
        s.queue_reflections();
        assert_eq!(s.next_reflection(), Some(a));
        assert_eq!(s.complete_reflection(), Some(a));
        assert_eq!(s.next_reflection(), Some(b));
        assert_eq!(s.complete_reflection(), Some(b));
        assert_eq!(s.next_reflection(), None);
    }
}
