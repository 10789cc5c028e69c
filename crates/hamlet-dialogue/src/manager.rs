//! The dialogue manager.
//!
//! Owns every active [`ConversationSession`] and drives them from the world
//! thread. Oracle calls run on a bounded pool of tokio tasks; their results
//! come back through an unbounded completion queue that [`DialogueManager::update`]
//! drains without blocking. All agent and world mutation happens inside
//! `update`, on the caller's thread.
//!
//! # Flow per session
//!
//! 1. `try_initiate` checks cooldown and willingness, then requests the
//!    first line.
//! 2. Each line is scanned locally for action markers. Marked lines go to
//!    action extraction, then outcome resolution, and the validated effects
//!    are applied before the next line is requested.
//! 3. At the turn cap (or when an action ends the talk) each participant
//!    reflects in turn, then the session closes and the pair's cooldown
//!    starts.
//!
//! Any oracle failure is absorbed: a canned line, a fizzled action or a
//! neutral reflection takes its place, and the conversation continues.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hamlet_agents::state_manager::{self, AppliedSummary};
use hamlet_agents::{Agent, ChanceWillingness, WillingnessCheck, World};
use hamlet_oracle::parse::truncate;
use hamlet_oracle::{CancelFlag, OracleClient, OracleError, OracleReply, OracleRequest};
use hamlet_types::{AgentId, Announcement, Placement, RequestId, SessionId, SimTime, Stage, StageRecord, StageStatus};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::DialogueConfig;
use crate::error::{DialogueError, InitiateRejection};
use crate::interpreter::{ActionDraft, ActionInterpreter, MarkerScan};
use crate::prompt::PromptEngine;
use crate::reflection::{self, Reflection, Reflector};
use crate::resolver::{self, OutcomeResolver, ProposedOutcome};
use crate::session::{ConversationSession, PendingRequest, SessionState};
use crate::sink::{StageSink, TracingStageSink};

/// Line substituted when the oracle fails to produce one. Contains no
/// action markers.
pub const FALLBACK_LINE: &str = "Hmm, where was I going with that?";

/// Characters kept in stage record summaries.
const SUMMARY_CHARS: usize = 160;

// ---------------------------------------------------------------------------
// Jobs and completions
// ---------------------------------------------------------------------------

/// Work handed to a pool task. Everything it needs is owned.
enum Job {
    Dialogue(OracleRequest),
    Action {
        request: OracleRequest,
        actor: AgentId,
        target: AgentId,
    },
    Outcome {
        request: OracleRequest,
        draft: ActionDraft,
    },
    Reflection(OracleRequest),
}

/// What a pool task produced.
enum Payload {
    Dialogue(Result<OracleReply, OracleError>),
    Action(Result<Option<ActionDraft>, OracleError>),
    Outcome(Result<ProposedOutcome, OracleError>),
    Reflection(Result<Reflection, OracleError>),
}

impl Payload {
    fn failed(stage: Stage, error: OracleError) -> Self {
        match stage {
            Stage::Dialogue => Self::Dialogue(Err(error)),
            Stage::Action => Self::Action(Err(error)),
            Stage::Outcome => Self::Outcome(Err(error)),
            Stage::Reflection => Self::Reflection(Err(error)),
        }
    }

    fn summary(&self) -> (StageStatus, String) {
        match self {
            Self::Dialogue(Ok(reply)) => (StageStatus::Succeeded, reply.text.clone()),
            Self::Action(Ok(Some(draft))) => (StageStatus::Succeeded, draft.description.clone()),
            Self::Action(Ok(None)) => (StageStatus::Succeeded, "no action".to_owned()),
            Self::Outcome(Ok(proposal)) => (StageStatus::Succeeded, proposal.narrative.clone()),
            Self::Reflection(Ok(reflection)) => (StageStatus::Succeeded, reflection.summary.clone()),
            Self::Dialogue(Err(e)) | Self::Action(Err(e)) | Self::Outcome(Err(e)) | Self::Reflection(Err(e)) => {
                (StageStatus::Degraded, e.to_string())
            }
        }
    }
}

struct Completion {
    session_id: SessionId,
    request_id: RequestId,
    latency: Duration,
    payload: Payload,
}

/// The oracle-facing half of each stage, shared with pool tasks.
#[derive(Clone)]
struct Pipeline {
    client: Arc<OracleClient>,
    interpreter: ActionInterpreter,
    resolver: OutcomeResolver,
    reflector: Reflector,
}

impl Pipeline {
    async fn run(&self, job: Job, cancel: &CancelFlag) -> Payload {
        match job {
            Job::Dialogue(request) => Payload::Dialogue(self.client.send(&request, cancel).await),
            Job::Action { request, actor, target } => {
                Payload::Action(self.interpreter.request(&request, actor, target, cancel).await)
            }
            Job::Outcome { request, draft } => Payload::Outcome(self.resolver.propose(&request, &draft, cancel).await),
            Job::Reflection(request) => Payload::Reflection(self.reflector.reflect(&request, cancel).await),
        }
    }
}

// ---------------------------------------------------------------------------
// Update report
// ---------------------------------------------------------------------------

/// What one call to [`DialogueManager::update`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Completions taken off the queue.
    pub drained: usize,
    /// Completions that advanced a session.
    pub applied: usize,
    /// Completions discarded as stale or for unknown sessions.
    pub ignored: usize,
    /// Sessions that closed during this update.
    pub closed: Vec<SessionId>,
    /// Announcements produced during this update.
    pub announcements: usize,
}

impl UpdateReport {
    /// Whether the update found nothing to do.
    pub const fn is_idle(&self) -> bool {
        self.drained == 0
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Drives all conversations in the world.
pub struct DialogueManager {
    config: DialogueConfig,
    runtime: Handle,
    prompts: Arc<PromptEngine>,
    pipeline: Arc<Pipeline>,
    workers: Arc<Semaphore>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    sessions: BTreeMap<SessionId, ConversationSession>,
    announcements: VecDeque<Announcement>,
    sink: Arc<dyn StageSink>,
    willingness: Box<dyn WillingnessCheck>,
    shut_down: bool,
}

impl std::fmt::Debug for DialogueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueManager")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("announcements", &self.announcements.len())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl DialogueManager {
    /// Create a manager whose pool tasks run on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`DialogueError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: DialogueConfig,
        client: Arc<OracleClient>,
        prompts: Arc<PromptEngine>,
        runtime: Handle,
    ) -> Result<Self, DialogueError> {
        config.validate()?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline {
            interpreter: ActionInterpreter::new(Arc::clone(&client), Arc::clone(&prompts), config.stages.action),
            resolver: OutcomeResolver::new(Arc::clone(&client), Arc::clone(&prompts), config.stages.outcome),
            reflector: Reflector::new(Arc::clone(&client), Arc::clone(&prompts), config.stages.reflection),
            client,
        };
        info!(
            pool_size = config.worker_pool_size,
            max_turns = config.max_turns_per_participant,
            cooldown_secs = config.cooldown_secs,
            "Dialogue manager ready"
        );
        Ok(Self {
            workers: Arc::new(Semaphore::new(config.worker_pool_size)),
            config,
            runtime,
            prompts,
            pipeline: Arc::new(pipeline),
            completions_tx,
            completions_rx,
            sessions: BTreeMap::new(),
            announcements: VecDeque::new(),
            sink: Arc::new(TracingStageSink),
            willingness: Box::new(ChanceWillingness::new()),
            shut_down: false,
        })
    }

    /// Send stage records to `sink` instead of tracing.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StageSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the willingness roll.
    #[must_use]
    pub fn with_willingness(mut self, willingness: impl WillingnessCheck + 'static) -> Self {
        self.willingness = Box::new(willingness);
        self
    }

    /// Replace the local action-marker scan.
    #[must_use]
    pub fn with_marker_scan(mut self, scan: Arc<dyn MarkerScan>) -> Self {
        let mut pipeline = (*self.pipeline).clone();
        pipeline.interpreter = pipeline.interpreter.with_marker_scan(scan);
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Active configuration.
    pub const fn config(&self) -> &DialogueConfig {
        &self.config
    }

    // -- queries --

    /// A session by ID, if still active.
    pub fn session(&self, id: SessionId) -> Option<&ConversationSession> {
        self.sessions.get(&id)
    }

    /// The active session `agent` is part of, if any.
    pub fn session_for_agent(&self, agent: AgentId) -> Option<&ConversationSession> {
        self.sessions.values().find(|s| s.involves(agent))
    }

    /// All active sessions.
    pub fn active_sessions(&self) -> impl Iterator<Item = &ConversationSession> {
        self.sessions.values()
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `agent` is in a conversation.
    pub fn is_busy(&self, agent: AgentId) -> bool {
        self.session_for_agent(agent).is_some()
    }

    /// Take every announcement produced since the last call.
    pub fn drain_announcements(&mut self) -> Vec<Announcement> {
        self.announcements.drain(..).collect()
    }

    // -- initiation --

    /// Start a conversation between `initiator` and `responder`.
    ///
    /// # Errors
    ///
    /// Returns an [`InitiateRejection`] saying why no session was started.
    pub fn try_initiate(
        &mut self,
        world: &World,
        initiator: AgentId,
        responder: AgentId,
        now: SimTime,
    ) -> Result<SessionId, InitiateRejection> {
        if self.shut_down {
            return Err(InitiateRejection::ShuttingDown);
        }
        if initiator == responder {
            return Err(InitiateRejection::SameAgent);
        }
        let first = world
            .agent(initiator)
            .map_err(|_| InitiateRejection::UnknownAgent(initiator))?;
        let second = world
            .agent(responder)
            .map_err(|_| InitiateRejection::UnknownAgent(responder))?;
        for agent in [initiator, responder] {
            if self.is_busy(agent) {
                return Err(InitiateRejection::AlreadyInSession { agent });
            }
        }
        if let Some(until) = world.cooldowns.blocked_until(initiator, responder, now) {
            debug!(initiator = %first.name, responder = %second.name, until = %until, "Pair on cooldown");
            return Err(InitiateRejection::OnCooldown { until });
        }
        for (agent, other) in [(first, second), (second, first)] {
            if !self.willingness.is_willing(agent, other) {
                debug!(agent = %agent.name, other = %other.name, "Declined to talk");
                return Err(InitiateRejection::Unwilling { agent: agent.id });
            }
        }

        let mut session =
            ConversationSession::new(initiator, responder, self.config.max_turns_per_participant, now);
        if session.transition(SessionState::Initiated).is_err() {
            return Err(InitiateRejection::ShuttingDown);
        }
        info!(
            session_id = %session.id(),
            initiator = %first.name,
            responder = %second.name,
            at = %now,
            "Conversation started"
        );
        self.request_dialogue(world, &mut session);
        let id = session.id();
        self.sessions.insert(id, session);
        Ok(id)
    }

    // -- update --

    /// Apply every completion that had arrived when the call began.
    ///
    /// Never blocks. Completions for work submitted during this call wait
    /// for the next one, so a session advances at most one stage per
    /// pending completion per update. Calling it with an empty queue
    /// changes nothing.
    pub fn update(&mut self, world: &mut World, now: SimTime) -> UpdateReport {
        let mut report = UpdateReport::default();
        let backlog = self.completions_rx.len();
        for _ in 0..backlog {
            let Ok(completion) = self.completions_rx.try_recv() else {
                break;
            };
            report.drained = report.drained.saturating_add(1);
            if self.advance(world, completion, now, &mut report) {
                report.applied = report.applied.saturating_add(1);
            } else {
                report.ignored = report.ignored.saturating_add(1);
            }
        }
        report
    }

    /// Cancel everything in flight and drop all sessions.
    ///
    /// Results that arrive afterwards are discarded. Returns the number of
    /// requests cancelled.
    pub fn shutdown(&mut self) -> usize {
        self.shut_down = true;
        let mut cancelled = 0_usize;
        for session in self.sessions.values_mut() {
            if session.cancel_pending() {
                cancelled = cancelled.saturating_add(1);
            }
        }
        let dropped = self.sessions.len();
        self.sessions.clear();
        self.workers.close();
        while self.completions_rx.try_recv().is_ok() {}
        info!(sessions = dropped, cancelled, "Dialogue manager shut down");
        cancelled
    }

    fn advance(&mut self, world: &mut World, completion: Completion, now: SimTime, report: &mut UpdateReport) -> bool {
        let Some(mut session) = self.sessions.remove(&completion.session_id) else {
            debug!(session_id = %completion.session_id, "Completion for unknown session discarded");
            return false;
        };
        let Some(pending) = session.take_pending(completion.request_id) else {
            debug!(session_id = %completion.session_id, "Stale completion discarded");
            self.sessions.insert(completion.session_id, session);
            return false;
        };
        self.record_stage(&session, &pending, &completion);

        let (a, b) = session.participants();
        if !world.contains(a) || !world.contains(b) {
            error!(session_id = %session.id(), "Participant missing from world, aborting session");
            session.abort();
        } else {
            match completion.payload {
                Payload::Dialogue(result) => self.on_dialogue(world, &mut session, result),
                Payload::Action(result) => self.on_action(world, &mut session, result),
                Payload::Outcome(result) => self.on_outcome(world, &mut session, result, now, report),
                Payload::Reflection(result) => self.on_reflection(world, &mut session, result, now),
            }
        }

        if session.state().is_closed() {
            self.finish(world, &session, now, report);
        } else {
            self.sessions.insert(session.id(), session);
        }
        true
    }

    // -- stage handlers --

    fn on_dialogue(&self, world: &World, session: &mut ConversationSession, result: Result<OracleReply, OracleError>) {
        let speaker_id = session.current_speaker();
        let speaker_name = name_of(world, speaker_id);
        let line = match result {
            Ok(reply) => clean_line(&reply.text, &speaker_name).unwrap_or_else(|| {
                warn!(session_id = %session.id(), speaker = %speaker_name, "Empty line, using fallback");
                FALLBACK_LINE.to_owned()
            }),
            Err(e) => {
                warn!(session_id = %session.id(), speaker = %speaker_name, error = %e, "Dialogue failed, using fallback line");
                FALLBACK_LINE.to_owned()
            }
        };
        if !step(session, SessionState::ActionCheck) {
            return;
        }
        debug!(session_id = %session.id(), speaker = %speaker_name, line = %line, "Line spoken");
        session.record_line(&speaker_name, line.clone());

        if !self.pipeline.interpreter.has_markers(&line) {
            self.record_skipped(session.id(), speaker_id, &line);
            self.next_turn(world, session);
            return;
        }
        let listener_id = session.current_listener();
        let job = lookup_pair(world, speaker_id, listener_id).and_then(|(actor, target)| {
            Ok(Job::Action {
                request: self
                    .pipeline
                    .interpreter
                    .request_for(actor, target, &line, session.transcript())?,
                actor: speaker_id,
                target: listener_id,
            })
        });
        self.submit(session, Stage::Action, Some(speaker_id), truncate(&line, SUMMARY_CHARS), job);
    }

    fn on_action(
        &self,
        world: &World,
        session: &mut ConversationSession,
        result: Result<Option<ActionDraft>, OracleError>,
    ) {
        let draft = match result {
            Ok(Some(draft)) => draft,
            Ok(None) => {
                self.next_turn(world, session);
                return;
            }
            Err(e) => {
                debug!(session_id = %session.id(), error = %e, "Action extraction failed, treating line as speech");
                self.next_turn(world, session);
                return;
            }
        };
        if !step(session, SessionState::AwaitingOutcome) {
            return;
        }
        debug!(session_id = %session.id(), action = %draft.description, "Action detected");
        let job = lookup_pair(world, draft.actor, draft.target).and_then(|(actor, target)| {
            Ok(Job::Outcome {
                request: self
                    .pipeline
                    .resolver
                    .request_for(&draft, actor, target, session.transcript())?,
                draft: draft.clone(),
            })
        });
        let actor = draft.actor;
        let summary = truncate(&draft.description, SUMMARY_CHARS);
        session.set_draft(draft);
        self.submit(session, Stage::Outcome, Some(actor), summary, job);
    }

    fn on_outcome(
        &mut self,
        world: &mut World,
        session: &mut ConversationSession,
        result: Result<ProposedOutcome, OracleError>,
        now: SimTime,
        report: &mut UpdateReport,
    ) {
        let Some(draft) = session.take_draft() else {
            error!(session_id = %session.id(), "Outcome arrived without a draft");
            if step(session, SessionState::EffectsApplied) {
                self.next_turn(world, session);
            }
            return;
        };
        let outcome = match lookup_pair(world, draft.actor, draft.target) {
            Ok((actor, target)) => resolver::finalize(result, &draft, actor, target),
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "Action participants missing");
                session.abort();
                return;
            }
        };
        for dropped in &outcome.dropped {
            debug!(session_id = %session.id(), reason = %dropped, "Effect dropped");
        }
        let applied = state_manager::apply_outcome(
            world,
            draft.actor,
            &outcome.actor_effects,
            draft.target,
            &outcome.target_effects,
            now,
        );
        if !step(session, SessionState::EffectsApplied) {
            return;
        }
        session.record_narration(outcome.narrative.clone());
        info!(
            session_id = %session.id(),
            success = outcome.success,
            narrative = %outcome.narrative,
            "Action resolved"
        );
        match applied {
            Ok((actor_summary, target_summary)) => {
                if !actor_summary.is_empty() || !target_summary.is_empty() {
                    self.announce(world, session.id(), draft.actor, &outcome.narrative, [&actor_summary, &target_summary]);
                    report.announcements = report.announcements.saturating_add(1);
                }
            }
            Err(e) => error!(session_id = %session.id(), error = %e, "Failed to apply outcome"),
        }

        if draft.ends_conversation {
            debug!(session_id = %session.id(), "Action ends the conversation");
            self.begin_conclusion(world, session);
        } else {
            self.next_turn(world, session);
        }
    }

    fn on_reflection(
        &self,
        world: &mut World,
        session: &mut ConversationSession,
        result: Result<Reflection, OracleError>,
        now: SimTime,
    ) {
        let Some(agent_id) = session.complete_reflection() else {
            error!(session_id = %session.id(), "Reflection arrived with none due");
            step(session, SessionState::Closed);
            return;
        };
        let other = session.partner_of(agent_id);
        let reflection = result.unwrap_or_else(|e| {
            warn!(session_id = %session.id(), error = %e, "Reflection failed, using fallback");
            Reflection::fallback()
        });
        if let Ok(agent) = world.agent_mut(agent_id) {
            let score = reflection::apply_reflection(agent, other, &reflection, now);
            info!(
                session_id = %session.id(),
                agent = %agent.name,
                feeling = %score,
                summary = %reflection.summary,
                "Reflection recorded"
            );
        }
        if session.next_reflection().is_some() {
            self.request_reflection(world, session);
        } else {
            step(session, SessionState::Closed);
        }
    }

    // -- transitions that submit work --

    fn next_turn(&self, world: &World, session: &mut ConversationSession) {
        if session.should_conclude() {
            self.begin_conclusion(world, session);
            return;
        }
        if !step(session, SessionState::Initiated) {
            return;
        }
        session.advance_turn();
        self.request_dialogue(world, session);
    }

    fn begin_conclusion(&self, world: &World, session: &mut ConversationSession) {
        if !step(session, SessionState::Concluding) {
            return;
        }
        info!(session_id = %session.id(), turns = session.total_turns(), "Conversation concluding");
        session.queue_reflections();
        self.request_reflection(world, session);
    }

    fn request_dialogue(&self, world: &World, session: &mut ConversationSession) {
        if !step(session, SessionState::AwaitingDialogue) {
            return;
        }
        let speaker_id = session.current_speaker();
        let listener_id = session.current_listener();
        let setting = self.config.stages.dialogue;
        let job = lookup_pair(world, speaker_id, listener_id).and_then(|(speaker, listener)| {
            let prompt = self.prompts.dialogue(
                speaker,
                listener,
                session.transcript(),
                session.turns_taken(speaker_id),
                session.max_turns_per_participant(),
            )?;
            Ok(Job::Dialogue(OracleRequest {
                stage: Stage::Dialogue,
                tier: setting.tier,
                prompt,
                max_tokens: setting.max_tokens,
            }))
        });
        let summary = format!(
            "turn {} by {}",
            session.total_turns().saturating_add(1),
            name_of(world, speaker_id)
        );
        self.submit(session, Stage::Dialogue, Some(speaker_id), summary, job);
    }

    fn request_reflection(&self, world: &World, session: &mut ConversationSession) {
        let Some(agent_id) = session.next_reflection() else {
            step(session, SessionState::Closed);
            return;
        };
        if !step(session, SessionState::AwaitingReflection) {
            return;
        }
        let other_id = session.partner_of(agent_id);
        let job = lookup_pair(world, agent_id, other_id).and_then(|(agent, other)| {
            Ok(Job::Reflection(
                self.pipeline
                    .reflector
                    .request_for(agent, other, session.transcript())?,
            ))
        });
        let summary = format!("reflection by {}", name_of(world, agent_id));
        self.submit(session, Stage::Reflection, Some(agent_id), summary, job);
    }

    // -- plumbing --

    fn submit(
        &self,
        session: &mut ConversationSession,
        stage: Stage,
        speaker: Option<AgentId>,
        input_summary: String,
        job: Result<Job, DialogueError>,
    ) {
        let Ok(pending) = session.begin_request(stage, speaker, input_summary) else {
            return;
        };
        match job {
            Ok(job) => self.spawn(session.id(), pending.request_id, pending.cancel, job),
            Err(e) => {
                warn!(session_id = %session.id(), stage = %stage, error = %e, "Could not prepare oracle request");
                self.enqueue(Completion {
                    session_id: session.id(),
                    request_id: pending.request_id,
                    latency: Duration::ZERO,
                    payload: Payload::failed(stage, OracleError::Config(e.to_string())),
                });
            }
        }
    }

    fn spawn(&self, session_id: SessionId, request_id: RequestId, cancel: CancelFlag, job: Job) {
        let pipeline = Arc::clone(&self.pipeline);
        let workers = Arc::clone(&self.workers);
        let tx = self.completions_tx.clone();
        self.runtime.spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            let started = Instant::now();
            let payload = pipeline.run(job, &cancel).await;
            if cancel.is_cancelled() {
                debug!(session_id = %session_id, "Discarding result of cancelled request");
                return;
            }
            let completion = Completion {
                session_id,
                request_id,
                latency: started.elapsed(),
                payload,
            };
            if tx.send(completion).is_err() {
                debug!(session_id = %session_id, "Completion queue closed");
            }
        });
    }

    fn enqueue(&self, completion: Completion) {
        if self.completions_tx.send(completion).is_err() {
            debug!("Completion queue closed");
        }
    }

    fn finish(&self, world: &mut World, session: &ConversationSession, now: SimTime, report: &mut UpdateReport) {
        let (a, b) = session.participants();
        let expiry = now.plus_secs(self.config.cooldown_secs);
        world.cooldowns.insert(a, b, expiry);
        report.closed.push(session.id());
        info!(
            session_id = %session.id(),
            turns = session.total_turns(),
            started = %session.started_at(),
            cooldown_until = %expiry,
            "Conversation closed"
        );
    }

    fn announce(
        &mut self,
        world: &World,
        session_id: SessionId,
        actor: AgentId,
        narrative: &str,
        summaries: [&AppliedSummary; 2],
    ) {
        let details: Vec<String> = summaries.iter().filter_map(|s| s.describe()).collect();
        let text = if details.is_empty() {
            narrative.to_owned()
        } else {
            format!("{narrative} ({})", details.join("; "))
        };
        let placement = world
            .agent(actor)
            .ok()
            .and_then(|agent| agent.position)
            .map_or(Placement::Centered, |(x, y)| Placement::Anchored { x, y });
        info!(session_id = %session_id, text = %text, "Announcement");
        self.announcements.push_back(Announcement {
            session_id,
            text,
            placement,
            duration_ticks: self.config.announcement_duration_ticks,
        });
    }

    fn record_stage(&self, session: &ConversationSession, pending: &PendingRequest, completion: &Completion) {
        let (status, result) = completion.payload.summary();
        debug!(
            session_id = %session.id(),
            stage = %pending.stage,
            turnaround = ?pending.submitted_at.elapsed(),
            "Completion applied"
        );
        self.sink.record(StageRecord {
            session_id: session.id(),
            speaker: pending.speaker,
            stage: pending.stage,
            input_summary: pending.input_summary.clone(),
            status,
            result: truncate(&result, SUMMARY_CHARS),
            latency_ms: u64::try_from(completion.latency.as_millis()).unwrap_or(u64::MAX),
            recorded_at: Utc::now(),
        });
    }

    fn record_skipped(&self, session_id: SessionId, speaker: AgentId, line: &str) {
        self.sink.record(StageRecord {
            session_id,
            speaker: Some(speaker),
            stage: Stage::Action,
            input_summary: truncate(line, SUMMARY_CHARS),
            status: StageStatus::Skipped,
            result: "no action markers".to_owned(),
            latency_ms: 0,
            recorded_at: Utc::now(),
        });
    }
}

/// Transition, or abort the session if the move is illegal.
fn step(session: &mut ConversationSession, next: SessionState) -> bool {
    if session.transition(next).is_ok() {
        true
    } else {
        session.abort();
        false
    }
}

fn lookup_pair(world: &World, a: AgentId, b: AgentId) -> Result<(&Agent, &Agent), DialogueError> {
    Ok((world.agent(a)?, world.agent(b)?))
}

fn name_of(world: &World, id: AgentId) -> String {
    world
        .agent(id)
        .map_or_else(|_| "someone".to_owned(), |agent| agent.name.clone())
}

/// Normalize a generated line: collapse whitespace, drop a leading
/// `Name:` prefix and surrounding quotes. `None` if nothing is left.
pub fn clean_line(raw: &str, speaker_name: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let prefix = format!("{speaker_name}:");
    let unprefixed = collapsed.strip_prefix(&prefix).map_or(collapsed.as_str(), str::trim_start);
    let unquoted = unprefixed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(unprefixed)
        .trim();
    (!unquoted.is_empty()).then(|| unquoted.to_owned())
}
