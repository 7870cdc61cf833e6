//! Orchestrator: one turn from utterance to outcome
//!
//! ```text
//! utterance → CatastrophicGate ──hit──────────────────────────┐
//!           → TempleInterruptGate ──hit───────────────────────┤
//!           → ClaimCollector → PriorityResolver → Governor    │
//!               ├─ loop awaiting reply → LoopingProtocol      │
//!               └─ clarification leads → start a loop         │
//!           → DraftingOracle (non-safety leaders) ←───────────┘
//!           → Session update → Monitor → MemoryStore / Voice
//! ```
//!
//! Every failure below this point is turned into a safe decision. Only an
//! invalid input reaches the caller as an error.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ArbiterConfig;
use crate::core::clarity::ClarityAnalyzer;
use crate::core::collaborators::{
    DraftDirective, DraftingOracle, MemoryStore, ResourceRouter, SessionSummary, StaticResourceRouter,
    VoiceSynthesizer,
};
use crate::core::collector::ClaimCollector;
use crate::core::detector::SignalDetector;
use crate::core::detectors::PAUSE_RESPONSE;
use crate::core::interrupt::TempleInterruptGate;
use crate::core::looping::{LoopContext, LoopingProtocol};
use crate::core::monitor::{GlobalSummary, Monitor, MonitorEvent, MonitorReport};
use crate::core::phrases::{self, PhraseKind};
use crate::core::resolver::{ConfidenceGovernor, PriorityResolver};
use crate::core::safety::CatastrophicGate;
use crate::core::session::{default_session_id, SessionManager};
use crate::core::tone_parser::ToneParser;
use crate::error::{ArbiterError, ArbiterResult, LoopingError};
use crate::types::{
    AudioHandle, Claim, Decision, DecisionLog, HistoryEntry, InterruptCategory, IntensityProfile, LoopOutcome,
    LoopPermission, LoopPhase, LoopingState, ReasonCode, SafetyStatus, Session, SpiralPhase,
    SubsystemId, Tone, TurnContext, TurnInput, TurnOutcome, UrgencyLevel,
};
use crate::DEFAULT_FALLBACK_CONFIDENCE;

/// User utterances handed to detectors as context
const RECENT_HISTORY: usize = 5;

/// Confidence of an interrupt-gate decision
const INTERRUPT_CONFIDENCE: f64 = 0.95;

/// Side results of a turn, alongside the decision
#[derive(Debug, Clone, Default)]
struct TurnNotes {
    loop_phase: Option<LoopPhase>,
    protocol_confidence: Option<f64>,
    /// Tone reported by the tonal-resonance claim
    tone: Option<Tone>,
    over_budget: bool,
    governed: bool,
    detector_failures: usize,
}

pub struct Orchestrator {
    config: ArbiterConfig,
    sessions: Arc<SessionManager>,
    gate: Arc<CatastrophicGate>,
    interrupts: TempleInterruptGate,
    collector: ClaimCollector,
    extra_detectors: Vec<Arc<dyn SignalDetector>>,
    resolver: PriorityResolver,
    governor: ConfidenceGovernor,
    looping: LoopingProtocol,
    clarity: ClarityAnalyzer,
    tones: ToneParser,
    monitor: Monitor,
    oracle: Option<Arc<dyn DraftingOracle>>,
    voice: Option<Arc<dyn VoiceSynthesizer>>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ArbiterConfig::default())
    }
}

impl Orchestrator {
    /// Engine with the built-in detectors and resource table, no collaborators
    pub fn new(config: ArbiterConfig) -> Self {
        let gate = Arc::new(CatastrophicGate::new(
            config.safety.clone(),
            Arc::new(StaticResourceRouter::new()),
        ));
        Self {
            sessions: Arc::new(SessionManager::new(config.session.clone())),
            collector: ClaimCollector::with_default_detectors(Arc::clone(&gate), config.collector.clone()),
            gate,
            interrupts: TempleInterruptGate::new(config.interrupt.clone()),
            extra_detectors: Vec::new(),
            resolver: PriorityResolver::new(&config.resolver),
            governor: ConfidenceGovernor::new(&config.resolver),
            looping: LoopingProtocol::new(config.looping.clone()),
            clarity: ClarityAnalyzer::new(),
            tones: ToneParser::new(),
            monitor: Monitor::new(&config),
            oracle: None,
            voice: None,
            memory: None,
            config,
        }
    }

    /// Replace the resource router used in crisis responses
    pub fn with_router(mut self, router: Arc<dyn ResourceRouter>) -> Self {
        self.gate = Arc::new(CatastrophicGate::new(self.config.safety.clone(), router));
        let mut collector =
            ClaimCollector::with_default_detectors(Arc::clone(&self.gate), self.config.collector.clone());
        for detector in &self.extra_detectors {
            collector.register(Arc::clone(detector));
        }
        self.collector = collector;
        self
    }

    /// Add a detector alongside the built-in set
    pub fn with_detector(mut self, detector: Arc<dyn SignalDetector>) -> Self {
        self.collector.register(Arc::clone(&detector));
        self.extra_detectors.push(detector);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn DraftingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_voice(mut self, voice: Arc<dyn VoiceSynthesizer>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Evict idle sessions and their monitor entries. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let evicted = self.sessions.sweep().await;
        self.monitor.forget(&evicted);
        evicted.len()
    }

    /// Run `sweep` on the configured interval until the orchestrator is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let period = self.config.session.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.sweep().await;
            }
        })
    }

    // =========================================================================
    // TURNS
    // =========================================================================

    /// Process one user turn
    pub async fn process_turn(&self, input: TurnInput) -> ArbiterResult<TurnOutcome> {
        input.validate()?;
        let session_id = input
            .session_id
            .clone()
            .unwrap_or_else(|| default_session_id(&input.user_id));
        self.guarded(&session_id, self.run_turn(&input)).await
    }

    /// The client observed silence after a checking question
    pub async fn handle_silence(&self, user_id: &str, session_id: Option<&str>) -> ArbiterResult<TurnOutcome> {
        if user_id.trim().is_empty() {
            return Err(ArbiterError::InvalidContext("user_id is required".into()));
        }
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| default_session_id(user_id));
        self.guarded(&id, self.run_silence(user_id, session_id)).await
    }

    async fn run_turn(&self, input: &TurnInput) -> ArbiterResult<TurnOutcome> {
        let mut session = self
            .sessions
            .acquire(&input.user_id, input.session_id.as_deref(), input.exchange_count)
            .await?;
        let utterance = input.utterance.trim();

        // A finished loop never resumes
        if session.loop_state.as_ref().is_some_and(|s| !s.is_awaiting_reply()) {
            session.loop_state = None;
        }

        let (decision, notes) = match self.gates(&mut session, utterance, &input.user_preferences.locale) {
            Some(gated) => gated,
            None => self.arbitrate(&mut session, input, utterance).await,
        };
        Ok(self.complete(&mut session, input, utterance, decision, notes).await)
    }

    async fn run_silence(&self, user_id: &str, session_id: Option<&str>) -> ArbiterResult<TurnOutcome> {
        let mut session = self.sessions.acquire(user_id, session_id, None).await?;

        let (decision, notes) = match session.loop_state.take() {
            Some(state) if state.is_awaiting_reply() => {
                let ctx = LoopContext::now(session.current_tone, SpiralPhase::default());
                self.continue_loop(&mut session, state, "", ctx, Vec::new(), TurnNotes::default())
            }
            _ => {
                let claim = Claim::new(SubsystemId::ContemplativePause, 0.7, PAUSE_RESPONSE, "client reported silence");
                let mut decision = Decision::from_claim(&claim, "silence outside a loop");
                decision.log.push_detail(ReasonCode::R202_CONFIDENT_LEADER, claim.subsystem_id);
                (decision, TurnNotes::default())
            }
        };

        session
            .history
            .push(HistoryEntry::assistant(decision.response.clone(), decision.leader));
        session.touch();
        Ok(self.outcome(&session, decision, &notes, None))
    }

    /// Safety gate, then interrupt gate. `Some` means the turn is decided.
    fn gates(&self, session: &mut Session, utterance: &str, locale: &str) -> Option<(Decision, TurnNotes)> {
        let mut notes = TurnNotes::default();

        let assessment = match std::panic::catch_unwind(AssertUnwindSafe(|| self.gate.assess(utterance, locale))) {
            Ok(assessment) => assessment,
            Err(payload) => {
                error!(
                    category = "safety_gate_failure",
                    session_id = %session.id,
                    timestamp = %Utc::now().to_rfc3339(),
                    error = %panic_message(payload.as_ref()),
                    "catastrophic gate failed, intervening"
                );
                let mut decision = Decision::safe_recovery(ReasonCode::R402_SAFETY_GATE_FAILURE, "catastrophic gate failed");
                notes.loop_phase = self.end_loop(session, LoopOutcome::Preempted, &mut decision.log);
                self.monitor.record(&session.id, MonitorEvent::Catastrophic);
                return Some((decision, notes));
            }
        };

        if assessment.detected {
            let category = assessment.category.map(|c| c.to_string()).unwrap_or_default();
            let claim = Claim::new(
                SubsystemId::CatastrophicGuard,
                assessment.confidence,
                assessment.response,
                category.clone(),
            )
            .with_urgency(UrgencyLevel::Critical);
            let mut decision = Decision::from_claim(&claim, ReasonCode::R101_CATASTROPHIC_OVERRIDE.description());
            decision.confidence = 1.0;
            decision.log.push_detail(ReasonCode::R101_CATASTROPHIC_OVERRIDE, &category);
            if assessment.reason == Some(ReasonCode::R102_CATASTROPHIC_CONTEXTUAL) {
                decision.log.push(ReasonCode::R102_CATASTROPHIC_CONTEXTUAL);
            }
            notes.loop_phase = self.end_loop(session, LoopOutcome::Preempted, &mut decision.log);
            self.monitor.record(&session.id, MonitorEvent::Catastrophic);
            return Some((decision, notes));
        }

        let interrupt = self.interrupts.evaluate(utterance);
        let category = interrupt.category.filter(|_| interrupt.interrupted)?;
        let claim = Claim::new(category.leader(), INTERRUPT_CONFIDENCE, interrupt.response, category.reason().description())
            .with_urgency(UrgencyLevel::High);
        let mut decision = Decision::from_claim(&claim, category.reason().description());
        decision.log.push(category.reason());
        let outcome = match category {
            InterruptCategory::Boundary => LoopOutcome::Boundary,
            InterruptCategory::Help => LoopOutcome::Redirected,
            InterruptCategory::Emergency | InterruptCategory::Time => LoopOutcome::Preempted,
        };
        notes.loop_phase = self.end_loop(session, outcome, &mut decision.log);
        self.monitor.record(&session.id, MonitorEvent::Interrupt);
        debug!(session_id = %session.id, category = ?category, "interrupt gate took the turn");
        Some((decision, notes))
    }

    /// Collect, resolve and govern; then continue or start a loop
    async fn arbitrate(&self, session: &mut Session, input: &TurnInput, utterance: &str) -> (Decision, TurnNotes) {
        let ctx = self.context(session, input).await;
        let collection = self.collector.collect(utterance, &ctx).await;

        let mut notes = TurnNotes {
            tone: collection
                .claims
                .iter()
                .find(|c| c.subsystem_id == SubsystemId::TonalResonance)
                .and_then(|c| c.metadata.tone),
            over_budget: collection.over_budget,
            detector_failures: collection.failures.len(),
            ..TurnNotes::default()
        };

        let mut decision = self.governor.govern(self.resolver.resolve(&collection.claims));
        notes.governed = decision.log.contains(ReasonCode::R206_GOVERNOR_OVERRIDE);

        if let Some(state) = session.loop_state.take() {
            if displaces_loop(decision.leader) {
                decision.log.push_detail(ReasonCode::R308_LOOP_DISPLACED, decision.leader);
                session.loop_state = Some(state);
                notes.loop_phase = self.end_loop(session, LoopOutcome::Displaced, &mut decision.log);
                return (decision, notes);
            }
            let loop_ctx = LoopContext::now(
                ctx.current_tone.or(notes.tone),
                input.spiral_phase.unwrap_or_default(),
            );
            return self.continue_loop(session, state, utterance, loop_ctx, collection.claims, notes);
        }

        if decision.leader == SubsystemId::Clarification {
            return self.start_loop(session, input, utterance, decision, notes);
        }
        // An ordinary turn with no loop closes the exchange
        session.loop_attempts = 0;
        (decision, notes)
    }

    /// Clarification leads: gate on protocol confidence, then begin
    fn start_loop(
        &self,
        session: &mut Session,
        input: &TurnInput,
        utterance: &str,
        mut decision: Decision,
        mut notes: TurnNotes,
    ) -> (Decision, TurnNotes) {
        let signals = self.clarity.analyze(utterance, input.emotional_intensity);
        let emotional = input
            .emotional_intensity
            .unwrap_or(signals.emotional_intensity)
            .clamp(0.0, 1.0);
        let confidence = self.interrupts.protocol_confidence(
            &signals,
            emotional,
            &input.user_preferences.locale,
            session.loop_attempts,
        );
        notes.protocol_confidence = Some(confidence.score);

        let tone = session
            .current_tone
            .or(input.current_tone)
            .or(input.user_preferences.preferred_tone)
            .or(notes.tone)
            .or_else(|| self.tones.dominant(utterance))
            .unwrap_or(Tone::Aether);

        let profile = match confidence.permission {
            LoopPermission::WitnessOnly => {
                decision.response = phrases::select(tone, PhraseKind::Witness, session.exchange_count as u32).to_string();
                decision
                    .log
                    .push_detail(ReasonCode::R305_LOOP_SUPPRESSED_WITNESS, format!("protocol confidence {:.2}", confidence.score));
                return (decision, notes);
            }
            LoopPermission::LightTouch => {
                decision
                    .log
                    .push_detail(ReasonCode::R306_LOOP_LIGHT_TOUCH, format!("protocol confidence {:.2}", confidence.score));
                IntensityProfile::Light
            }
            LoopPermission::Full => input.user_preferences.looping_intensity,
        };

        match self.looping.begin(utterance, profile, tone) {
            Ok((state, turn)) => {
                decision.response = turn.response;
                decision
                    .log
                    .push_detail(ReasonCode::R301_LOOP_STARTED, format!("{:?} profile, {} lens", profile, tone));
                notes.loop_phase = Some(state.phase);
                session.loop_state = Some(state);
                session.loop_attempts += 1;
                self.monitor.record(&session.id, MonitorEvent::LoopStarted);
            }
            Err(err) => {
                log_loop_failure(&session.id, &err);
                decision.response = phrases::select(tone, PhraseKind::Witness, 0).to_string();
                decision.log.push_detail(ReasonCode::R307_LOOP_FAILURE, &err);
                notes.loop_phase = Some(LoopPhase::Aborted);
            }
        }
        (decision, notes)
    }

    /// Fold this turn's utterance into the awaiting loop
    fn continue_loop(
        &self,
        session: &mut Session,
        mut state: LoopingState,
        utterance: &str,
        ctx: LoopContext,
        claims: Vec<Claim>,
        mut notes: TurnNotes,
    ) -> (Decision, TurnNotes) {
        let rejections_before = state.rejection_count;
        let mut log = DecisionLog { claims, ..DecisionLog::default() };

        let turn = match self.looping.advance(&mut state, utterance, ctx) {
            Ok(turn) => turn,
            Err(err) => {
                log_loop_failure(&session.id, &err);
                self.looping.abort(&mut state, LoopOutcome::Failure);
                self.monitor.record(&session.id, MonitorEvent::LoopEnded(LoopOutcome::Failure));
                log.reason = ReasonCode::R307_LOOP_FAILURE.description().to_string();
                log.push_detail(ReasonCode::R307_LOOP_FAILURE, &err);
                notes.loop_phase = Some(state.phase);
                let decision = Decision {
                    leader: SubsystemId::Clarification,
                    response: phrases::select(state.tone, PhraseKind::Witness, state.loop_count).to_string(),
                    confidence: DEFAULT_FALLBACK_CONFIDENCE,
                    fallback: None,
                    log,
                };
                return (decision, notes);
            }
        };

        if let Some(reply) = turn.reply {
            self.monitor.record(
                &session.id,
                MonitorEvent::LoopReply { reply, rejected: state.rejection_count > rejections_before },
            );
        }

        let leader = match turn.outcome {
            Some(LoopOutcome::Boundary) => SubsystemId::ExplicitBoundary,
            _ => SubsystemId::Clarification,
        };
        let confidence = state.convergence.max(DEFAULT_FALLBACK_CONFIDENCE);

        match turn.outcome {
            Some(outcome) => {
                let code = if state.phase == LoopPhase::Aborted {
                    ReasonCode::R304_LOOP_ABORTED
                } else {
                    ReasonCode::R303_LOOP_TRANSITIONED
                };
                log.reason = code.description().to_string();
                log.push_detail(code, format!("{:?} at convergence {:.2}", outcome, state.convergence));
                self.monitor.record(&session.id, MonitorEvent::LoopEnded(outcome));
            }
            None => {
                log.reason = ReasonCode::R302_LOOP_CONTINUED.description().to_string();
                let advice = match (turn.pattern, turn.action) {
                    (Some(pattern), Some(action)) => format!(", {:?}, advise {:?}", pattern, action),
                    _ => String::new(),
                };
                log.push_detail(
                    ReasonCode::R302_LOOP_CONTINUED,
                    format!("iteration {}/{}{}", state.loop_count, state.max_loops, advice),
                );
                session.loop_state = Some(state);
            }
        }
        notes.loop_phase = Some(turn.phase);

        let decision = Decision {
            leader,
            response: turn.response,
            confidence,
            fallback: None,
            log,
        };
        (decision, notes)
    }

    /// End the session's loop, if any, and note why
    fn end_loop(&self, session: &mut Session, outcome: LoopOutcome, log: &mut DecisionLog) -> Option<LoopPhase> {
        let mut state = session.loop_state.take()?;
        self.looping.abort(&mut state, outcome);
        let code = if state.phase == LoopPhase::Aborted {
            ReasonCode::R304_LOOP_ABORTED
        } else {
            ReasonCode::R303_LOOP_TRANSITIONED
        };
        log.push_detail(code, format!("{:?} after {} iteration(s)", outcome, state.loop_count));
        self.monitor.record(&session.id, MonitorEvent::LoopEnded(outcome));
        Some(state.phase)
    }

    /// Draft, record, notify collaborators
    async fn complete(
        &self,
        session: &mut Session,
        input: &TurnInput,
        utterance: &str,
        mut decision: Decision,
        notes: TurnNotes,
    ) -> TurnOutcome {
        if drafts(decision.leader) {
            if let Some(oracle) = &self.oracle {
                let directive = DraftDirective {
                    leader: decision.leader,
                    skeleton: decision.response.clone(),
                    tone: notes.tone.or(session.current_tone),
                    blend_tone: decision.log.blend_tone,
                    assistant_name: input.user_preferences.assistant_name.clone(),
                };
                match oracle.draft(&directive).await {
                    Ok(text) if !text.trim().is_empty() => decision.response = text,
                    Ok(_) => debug!(session_id = %session.id, "empty draft ignored"),
                    Err(err) => warn!(
                        category = "drafting_oracle",
                        session_id = %session.id,
                        timestamp = %Utc::now().to_rfc3339(),
                        error = %err,
                        "drafting failed, using directive text"
                    ),
                }
            }
        }

        session.record_exchange(utterance, &decision.response, decision.leader, notes.tone);
        self.monitor.record(
            &session.id,
            MonitorEvent::Turn {
                leader: decision.leader,
                over_budget: notes.over_budget,
                governed: notes.governed,
                detector_failures: notes.detector_failures,
            },
        );

        if let Some(memory) = &self.memory {
            let summary = SessionSummary {
                session_id: session.id.clone(),
                user_id: session.user_id.clone(),
                exchange_count: session.exchange_count,
                depth: session.depth,
                current_tone: session.current_tone,
                last_leader: decision.leader,
                at: Utc::now(),
            };
            if let Err(err) = memory.write_summary(&summary).await {
                warn!(
                    category = "memory_store",
                    session_id = %session.id,
                    timestamp = %Utc::now().to_rfc3339(),
                    error = %err,
                    "summary write failed"
                );
            }
        }

        let audio = match &self.voice {
            Some(voice) => match voice.synthesize(&decision.response, session.current_tone).await {
                Ok(audio) => Some(audio),
                Err(err) => {
                    warn!(
                        category = "voice_synthesizer",
                        session_id = %session.id,
                        timestamp = %Utc::now().to_rfc3339(),
                        error = %err,
                        "synthesis failed, text only"
                    );
                    None
                }
            },
            None => None,
        };

        self.outcome(session, decision, &notes, audio)
    }

    fn outcome(
        &self,
        session: &Session,
        decision: Decision,
        notes: &TurnNotes,
        audio: Option<AudioHandle>,
    ) -> TurnOutcome {
        let outcome = TurnOutcome {
            timestamp: Utc::now(),
            decision,
            session_id: session.id.clone(),
            exchange_count: session.exchange_count,
            depth: session.depth,
            loop_phase: notes.loop_phase,
            protocol_confidence: notes.protocol_confidence,
            safety_status: self.gate.status(),
            audio,
        };
        info!(
            session_id = %outcome.session_id,
            leader = %outcome.decision.leader,
            confidence = outcome.decision.confidence,
            exchange_count = outcome.exchange_count,
            loop_phase = ?outcome.loop_phase,
            "turn processed"
        );
        outcome
    }

    /// Detector context for this turn
    async fn context(&self, session: &Session, input: &TurnInput) -> TurnContext {
        let mut recent_history = if input.conversation_history.is_empty() {
            session.history.recent_user_texts(RECENT_HISTORY)
        } else {
            let skip = input.conversation_history.len().saturating_sub(RECENT_HISTORY);
            input.conversation_history[skip..].to_vec()
        };

        if recent_history.is_empty() {
            if let Some(memory) = &self.memory {
                match memory.recent(&session.user_id, RECENT_HISTORY).await {
                    Ok(texts) => recent_history = texts,
                    Err(err) => warn!(
                        category = "memory_store",
                        session_id = %session.id,
                        timestamp = %Utc::now().to_rfc3339(),
                        error = %err,
                        "history read failed"
                    ),
                }
            }
        }

        TurnContext {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            exchange_count: session.exchange_count,
            depth: input.depth.unwrap_or(session.depth),
            current_tone: input.current_tone.or(session.current_tone),
            emotional_intensity: input.emotional_intensity.unwrap_or(0.0).clamp(0.0, 1.0),
            recent_history,
            spiral_phase: input.spiral_phase.unwrap_or_default(),
            preferences: input.user_preferences.clone(),
            loop_active: session.loop_state.is_some(),
            // `gates` ran first and found nothing
            safety_cleared: true,
        }
    }

    /// Run a turn future, turning a panic into a safe decision
    async fn guarded<F>(&self, session_id: &str, turn: F) -> ArbiterResult<TurnOutcome>
    where
        F: Future<Output = ArbiterResult<TurnOutcome>>,
    {
        let payload = match AssertUnwindSafe(turn).catch_unwind().await {
            Ok(result) => return result,
            Err(payload) => payload,
        };
        let err = ArbiterError::Orchestration(panic_message(payload.as_ref()));
        error!(
            category = "orchestration_failure",
            session_id,
            timestamp = %Utc::now().to_rfc3339(),
            error = %err,
            "turn failed, returning safe response"
        );

        let decision = Decision::safe_recovery(ReasonCode::R401_ORCHESTRATION_RECOVERED, &err);
        let session = self.sessions.snapshot(session_id).await;
        Ok(TurnOutcome {
            timestamp: Utc::now(),
            decision,
            session_id: session_id.to_string(),
            exchange_count: session.as_ref().map_or(0, |s| s.exchange_count),
            depth: session.as_ref().map(|s| s.depth).unwrap_or_default(),
            loop_phase: None,
            protocol_confidence: None,
            safety_status: self.gate.status(),
            audio: None,
        })
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub async fn session_snapshot(&self, session_id: &str) -> Option<Session> {
        self.sessions.snapshot(session_id).await
    }

    pub fn metrics(&self, session_id: &str) -> Option<MonitorReport> {
        self.monitor.report(session_id)
    }

    pub fn monitor_summary(&self) -> GlobalSummary {
        self.monitor.global_summary()
    }

    pub fn safety_status(&self) -> SafetyStatus {
        self.gate.status()
    }

    /// Detections held in the gate's ring buffer
    pub fn recent_detections(&self) -> usize {
        self.gate.recent_detections().len()
    }
}

/// Leaders that end an awaiting loop instead of feeding it
fn displaces_loop(leader: SubsystemId) -> bool {
    leader.default_priority() < SubsystemId::Clarification.default_priority()
}

/// Safety and boundary scripts go out verbatim
fn drafts(leader: SubsystemId) -> bool {
    !matches!(
        leader,
        SubsystemId::CatastrophicGuard | SubsystemId::Safety | SubsystemId::ExplicitBoundary
    )
}

fn log_loop_failure(session_id: &str, err: &LoopingError) {
    error!(
        category = "looping_failure",
        session_id,
        timestamp = %Utc::now().to_rfc3339(),
        error = %err,
        "looping failed, falling back to witness"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================
