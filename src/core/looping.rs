//! Looping: the bounded paraphrase / check / correct protocol
//!
//! ```text
//! Idle → Listening → Paraphrasing → Checking ─(reply)→ Correcting
//!                          ↑                               │
//!                          └──────── continue ─────────────┤
//!                                                          ├→ Transitioning
//!                                                          └→ Aborted
//! ```
//!
//! The state lives on the session between turns. `loop_count` counts
//! paraphrase-check iterations presented and never exceeds `max_loops`.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::config::LoopingConfig;
use crate::core::convergence::{detect_pattern, user_confirmation, ConvergenceTracker};
use crate::core::detectors::BOUNDARY_RESPONSE;
use crate::core::interrupt::TempleInterruptGate;
use crate::core::phrases::{self, distill_essence, PhraseKind};
use crate::error::LoopingError;
use crate::types::{
    Adjustment, ConvergenceMetrics, ConvergencePattern, InterruptCategory, IntensityProfile,
    LoopOutcome, LoopPhase, LoopingState, RecommendedAction, ReplyKind, SpiralPhase, Tone,
};
use crate::LOOP_SILENCE_ASSUMED_CONVERGENCE;

lazy_static! {
    static ref RE_NON_REPLY: Regex = Regex::new(
        r"(?i)^\s*((um+|uh+|h+m+|\.+|…|\s|,)*)\s*$"
    ).unwrap();

    static ref RE_CORRECTION_CONTENT: Regex = Regex::new(
        r"(?i)(?:i meant|what i meant (?:was|is)|what i mean is|actually,?|it'?s more (?:like|that)|more like|rather,?)\s+(?P<content>.+)"
    ).unwrap();

    static ref RE_LEADING_REJECTION: Regex = Regex::new(
        r"(?i)^\s*(no|nope|not quite|not really|sort of|kind of|well)\b[\s,.!-]*"
    ).unwrap();
}

/// Session-side inputs for one loop step
#[derive(Debug, Clone, Copy)]
pub struct LoopContext {
    pub session_tone: Option<Tone>,
    pub spiral_phase: SpiralPhase,
    pub now: DateTime<Utc>,
}

impl LoopContext {
    pub fn now(session_tone: Option<Tone>, spiral_phase: SpiralPhase) -> Self {
        Self { session_tone, spiral_phase, now: Utc::now() }
    }
}

/// What one loop step produced
#[derive(Debug, Clone, PartialEq)]
pub struct LoopTurn {
    pub phase: LoopPhase,
    pub response: String,
    pub reply: Option<ReplyKind>,
    pub metrics: Option<ConvergenceMetrics>,
    /// Advisory trend over the last three convergence points
    pub pattern: Option<ConvergencePattern>,
    /// Advisory next step for the current convergence
    pub action: Option<RecommendedAction>,
    /// Set when the step ended the loop
    pub outcome: Option<LoopOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct LoopingProtocol {
    config: LoopingConfig,
    interrupts: TempleInterruptGate,
}

impl LoopingProtocol {
    pub fn new(config: LoopingConfig) -> Self {
        Self { config, interrupts: TempleInterruptGate::default() }
    }

    /// Capture a surface utterance and issue the first paraphrase and check
    pub fn begin(
        &self,
        surface: &str,
        profile: IntensityProfile,
        tone: Tone,
    ) -> Result<(LoopingState, LoopTurn), LoopingError> {
        profile.thresholds().validate()?;

        let mut state = LoopingState::new(surface.trim(), profile, tone);
        debug!(phase = %LoopPhase::Listening, "surface captured");

        state.phase = LoopPhase::Paraphrasing;
        state.essential_meaning_guess = distill_essence(&state.surface_capture);
        state.loop_count = 1;
        let response = self.paraphrase_and_check(&state, None);

        state.phase = LoopPhase::Checking;
        state.awaiting_since = Some(Utc::now());

        debug!(profile = ?profile, tone = %tone, max_loops = state.max_loops, "loop started");
        let phase = state.phase;
        Ok((state, LoopTurn {
            phase,
            response,
            reply: None,
            metrics: None,
            pattern: None,
            action: None,
            outcome: None,
        }))
    }

    /// Fold the user's reply into the loop
    pub fn advance(
        &self,
        state: &mut LoopingState,
        reply: &str,
        ctx: LoopContext,
    ) -> Result<LoopTurn, LoopingError> {
        if state.phase != LoopPhase::Checking {
            return Err(LoopingError::InvalidPhase { action: "advance", phase: state.phase.to_string() });
        }
        if state.loop_count > state.max_loops {
            return Err(LoopingError::BudgetExceeded { loop_count: state.loop_count, max_loops: state.max_loops });
        }

        let thresholds = state.profile.thresholds();
        thresholds.validate()?;
        let tracker = ConvergenceTracker::new(thresholds);

        // Explicit stop is honored before anything else
        let interrupt = self.interrupts.evaluate(reply);
        if interrupt.category == Some(InterruptCategory::Boundary) {
            return Ok(self.finish(state, LoopOutcome::Boundary, BOUNDARY_RESPONSE.to_string(), None, None));
        }

        let kind = self.classify(state, reply, ctx.now);
        state.phase = LoopPhase::Correcting;

        if kind == ReplyKind::Silent {
            return Ok(self.on_silence(state));
        }

        let previous = state.essential_meaning_guess.clone();
        let confirmation = user_confirmation(Some(reply));
        if confirmation < 0.5 {
            state.rejection_count += 1;
        }
        let revised = match kind {
            ReplyKind::Correct => correction_content(reply).unwrap_or_else(|| previous.clone()),
            _ => previous.clone(),
        };

        let metrics = tracker.measure(state, Some(reply), ctx.session_tone, ctx.spiral_phase);
        state.essential_meaning_guess = revised.clone();
        state.convergence = metrics.overall;
        state.convergence_history.push(metrics.overall);
        state.last_metrics = Some(metrics);
        state.adjustment_history.push(Adjustment {
            iteration: state.loop_count,
            reply: kind,
            previous_guess: previous.clone(),
            revised_guess: revised.clone(),
            convergence: metrics.overall,
        });

        let pattern = detect_pattern(&state.convergence_history);
        let action = tracker.recommended_action(&metrics);

        if let Some(outcome) = self.stop_outcome(&tracker, &metrics, state) {
            let kind_of_phrase = match outcome {
                LoopOutcome::ParadigmMismatch => PhraseKind::Alternative,
                _ => PhraseKind::Transition,
            };
            let response = phrases::select(state.tone, kind_of_phrase, state.loop_count).to_string();
            let mut turn = self.finish(state, outcome, response, Some(kind), Some(metrics));
            turn.pattern = Some(pattern);
            turn.action = Some(action);
            return Ok(turn);
        }

        state.loop_count += 1;
        state.phase = LoopPhase::Paraphrasing;
        let correction = (kind == ReplyKind::Correct && revised != previous).then_some(previous.as_str());
        let response = self.paraphrase_and_check(state, correction);
        state.phase = LoopPhase::Checking;
        state.awaiting_since = Some(ctx.now);

        debug!(
            loop_count = state.loop_count,
            convergence = metrics.overall,
            reply = ?kind,
            pattern = ?pattern,
            action = ?action,
            "loop continued"
        );
        Ok(LoopTurn {
            phase: state.phase,
            response,
            reply: Some(kind),
            metrics: Some(metrics),
            pattern: Some(pattern),
            action: Some(action),
            outcome: None,
        })
    }

    /// Why the loop stops after this reply, if it does
    ///
    /// Budget, then optimal convergence, then repeated rejection, then a
    /// flat trend. Rejections score uniformly low, so a run of them also
    /// reads as flat; checking them first keeps the mismatch reachable.
    fn stop_outcome(
        &self,
        tracker: &ConvergenceTracker,
        metrics: &ConvergenceMetrics,
        state: &LoopingState,
    ) -> Option<LoopOutcome> {
        let mismatch = state.rejection_count >= self.config.paradigm_mismatch_threshold;
        if tracker.should_continue_looping(metrics, &state.convergence_history, state.loop_count, state.max_loops) {
            return mismatch.then_some(LoopOutcome::ParadigmMismatch);
        }
        let outcome = if state.loop_count >= state.max_loops {
            LoopOutcome::MaxIterations
        } else if metrics.overall >= tracker.thresholds().optimal {
            LoopOutcome::Converged
        } else if mismatch {
            LoopOutcome::ParadigmMismatch
        } else {
            LoopOutcome::Plateau
        };
        Some(outcome)
    }

    /// End a loop from outside (interrupt, displacement, failure)
    pub fn abort(&self, state: &mut LoopingState, outcome: LoopOutcome) {
        state.phase = outcome.terminal_phase();
        state.awaiting_since = None;
        debug!(outcome = ?outcome, loop_count = state.loop_count, "loop ended externally");
    }

    fn classify(&self, state: &LoopingState, reply: &str, now: DateTime<Utc>) -> ReplyKind {
        let trimmed = reply.trim();
        if trimmed.is_empty() || RE_NON_REPLY.is_match(trimmed) {
            return ReplyKind::Silent;
        }

        let confirmation = user_confirmation(Some(trimmed));
        let words = trimmed.split_whitespace().count();
        let timed_out = state
            .awaiting_since
            .is_some_and(|since| now - since > self.config.silence_timeout());

        // A late, non-committal one-word reply is a silence
        if timed_out && words <= 1 && confirmation == 0.5 {
            return ReplyKind::Silent;
        }

        if confirmation < 0.5 || correction_content(trimmed).is_some() {
            ReplyKind::Correct
        } else if confirmation == 0.5 && words > 3 {
            // Neutral elaboration refines the guess
            ReplyKind::Correct
        } else {
            ReplyKind::Agree
        }
    }

    fn on_silence(&self, state: &mut LoopingState) -> LoopTurn {
        state.silence_count += 1;
        if state.silence_count >= self.config.max_silences {
            state.convergence = LOOP_SILENCE_ASSUMED_CONVERGENCE;
            state.convergence_history.push(LOOP_SILENCE_ASSUMED_CONVERGENCE);
            let response = phrases::select(state.tone, PhraseKind::NeedsSpace, state.silence_count).to_string();
            return self.finish(state, LoopOutcome::NeedsSpace, response, Some(ReplyKind::Silent), None);
        }

        state.phase = LoopPhase::Checking;
        state.awaiting_since = Some(Utc::now());
        let check = phrases::select(state.tone, PhraseKind::Check, state.loop_count + state.silence_count);
        LoopTurn {
            phase: state.phase,
            response: format!("Take your time. {}", check),
            reply: Some(ReplyKind::Silent),
            metrics: None,
            pattern: None,
            action: None,
            outcome: None,
        }
    }

    fn paraphrase_and_check(&self, state: &LoopingState, previous: Option<&str>) -> String {
        let iteration = state.loop_count.saturating_sub(1);
        let reflection = match previous {
            Some(previous) => phrases::render(
                state.tone,
                PhraseKind::Correction,
                iteration,
                &state.essential_meaning_guess,
                previous,
            ),
            None => phrases::render(
                state.tone,
                PhraseKind::Paraphrase,
                iteration,
                &state.essential_meaning_guess,
                "",
            ),
        };
        let check = phrases::select(state.tone, PhraseKind::Check, iteration);
        format!("{} {}", reflection, check)
    }

    fn finish(
        &self,
        state: &mut LoopingState,
        outcome: LoopOutcome,
        response: String,
        reply: Option<ReplyKind>,
        metrics: Option<ConvergenceMetrics>,
    ) -> LoopTurn {
        state.phase = outcome.terminal_phase();
        state.awaiting_since = None;
        debug!(outcome = ?outcome, loop_count = state.loop_count, convergence = state.convergence, "loop ended");
        LoopTurn {
            phase: state.phase,
            response,
            reply,
            metrics,
            pattern: None,
            action: None,
            outcome: Some(outcome),
        }
    }
}

/// New essential meaning carried by a correction, if any
fn correction_content(reply: &str) -> Option<String> {
    if let Some(caps) = RE_CORRECTION_CONTENT.captures(reply) {
        let content = caps.name("content").map(|m| m.as_str()).unwrap_or("");
        if !content.trim().is_empty() {
            return Some(distill_essence(content));
        }
    }
    let remainder = RE_LEADING_REJECTION.replace(reply, "");
    if remainder.len() < reply.len() && remainder.split_whitespace().count() > 2 {
        return Some(distill_essence(&remainder));
    }
    None
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn protocol() -> LoopingProtocol {
        LoopingProtocol::default()
    }

    fn ctx() -> LoopContext {
        LoopContext::now(Some(Tone::Water), SpiralPhase::Transformation)
    }

    fn started(profile: IntensityProfile) -> LoopingState {
        protocol()
            .begin("I kind of feel stuck, I don't know, with my job", profile, Tone::Water)
            .unwrap()
            .0
    }

    #[test]
    fn test_begin_issues_paraphrase_and_check() {
        let (state, turn) = protocol()
            .begin("I'm tired of my job", IntensityProfile::Full, Tone::Water)
            .unwrap();
        assert_eq!(state.phase, LoopPhase::Checking);
        assert_eq!(state.loop_count, 1);
        assert_eq!(state.essential_meaning_guess, "you're tired of your job");
        assert!(turn.response.contains("you're tired of your job"));
        assert!(turn.response.ends_with('?'));
        assert!(state.awaiting_since.is_some());
    }

    #[test]
    fn test_boundary_reply_aborts() {
        let mut state = started(IntensityProfile::Full);
        let turn = protocol().advance(&mut state, "stop asking me questions", ctx()).unwrap();
        assert_eq!(turn.outcome, Some(LoopOutcome::Boundary));
        assert_eq!(state.phase, LoopPhase::Aborted);
        assert_eq!(turn.response, BOUNDARY_RESPONSE);
    }

    #[test]
    fn test_light_profile_ends_after_one_reply() {
        let mut state = started(IntensityProfile::Light);
        let turn = protocol()
            .advance(&mut state, "Yes, exactly, that's it. I feel so stuck and sad", ctx())
            .unwrap();
        assert!(state.is_terminal());
        assert_eq!(state.phase, LoopPhase::Transitioning);
        assert!(turn.outcome.is_some());
    }

    #[test]
    fn test_budget_checked_before_convergence() {
        let protocol = protocol();
        let tracker = ConvergenceTracker::new(IntensityProfile::Full.thresholds());
        let mut state = started(IntensityProfile::Full);
        state.loop_count = state.max_loops;
        state.convergence_history = vec![0.5, 0.8, 0.95];

        let converged = ConvergenceMetrics::uniform(0.95);
        assert_eq!(protocol.stop_outcome(&tracker, &converged, &state), Some(LoopOutcome::MaxIterations));

        state.loop_count = 2;
        assert_eq!(protocol.stop_outcome(&tracker, &converged, &state), Some(LoopOutcome::Converged));
    }

    #[test]
    fn test_stop_outcome_mismatch_and_plateau() {
        let protocol = protocol();
        let tracker = ConvergenceTracker::new(IntensityProfile::Sacred.thresholds());
        let mut state = started(IntensityProfile::Sacred);
        state.loop_count = 3;
        state.convergence_history = vec![0.30, 0.31, 0.30];
        let flat = ConvergenceMetrics::uniform(0.30);

        assert_eq!(protocol.stop_outcome(&tracker, &flat, &state), Some(LoopOutcome::Plateau));
        state.rejection_count = 3;
        assert_eq!(protocol.stop_outcome(&tracker, &flat, &state), Some(LoopOutcome::ParadigmMismatch));

        state.rejection_count = 0;
        state.convergence_history = vec![0.30, 0.45, 0.60];
        assert_eq!(protocol.stop_outcome(&tracker, &ConvergenceMetrics::uniform(0.60), &state), None);
    }

    #[test]
    fn test_continuing_turn_carries_advice() {
        let mut state = started(IntensityProfile::Sacred);
        let turn = protocol()
            .advance(&mut state, "No, what I meant is that I miss my old team", ctx())
            .unwrap();
        assert_eq!(turn.outcome, None);
        assert_eq!(turn.pattern, Some(ConvergencePattern::Insufficient));
        assert!(turn.action.is_some());
    }

    #[test]
    fn test_correction_revises_guess() {
        let mut state = started(IntensityProfile::Sacred);
        let turn = protocol()
            .advance(&mut state, "No, what I meant is that I miss my old team", ctx())
            .unwrap();
        assert_eq!(turn.reply, Some(ReplyKind::Correct));
        assert_eq!(state.essential_meaning_guess, "you miss your old team");
        assert_eq!(state.adjustment_history.len(), 1);
        assert_eq!(state.rejection_count, 1);
        assert_eq!(state.loop_count, 2);
        assert!(turn.response.contains("more that you miss your old team"));
    }

    #[test]
    fn test_silence_twice_needs_space() {
        let mut state = started(IntensityProfile::Sacred);
        let first = protocol().advance(&mut state, "", ctx()).unwrap();
        assert_eq!(first.outcome, None);
        assert_eq!(state.phase, LoopPhase::Checking);
        let second = protocol().advance(&mut state, "...", ctx()).unwrap();
        assert_eq!(second.outcome, Some(LoopOutcome::NeedsSpace));
        assert_eq!(state.phase, LoopPhase::Transitioning);
        assert_eq!(state.convergence, LOOP_SILENCE_ASSUMED_CONVERGENCE);
    }

    #[test]
    fn test_late_one_word_reply_is_silence() {
        let mut state = started(IntensityProfile::Sacred);
        let late = LoopContext {
            now: Utc::now() + Duration::seconds(30),
            ..ctx()
        };
        let turn = protocol().advance(&mut state, "ok", late).unwrap();
        assert_eq!(turn.reply, Some(ReplyKind::Silent));
        assert_eq!(state.silence_count, 1);
    }

    #[test]
    fn test_repeated_rejection_offers_alternative() {
        let mut state = started(IntensityProfile::Sacred);
        let replies = [
            "No, that's wrong, it's more like my family",
            "No, wrong again, it's more like my brother in particular",
            "Nope. It's more like the distance between us now",
        ];
        let mut last = None;
        for reply in replies {
            let turn = protocol().advance(&mut state, reply, ctx()).unwrap();
            last = Some(turn);
            if state.is_terminal() {
                break;
            }
        }
        let last = last.unwrap();
        assert!(state.is_terminal());
        assert_eq!(state.phase, LoopPhase::Aborted);
        assert_eq!(last.outcome, Some(LoopOutcome::ParadigmMismatch));
        assert_eq!(state.rejection_count, 3);
    }

    #[test]
    fn test_advance_outside_checking_rejected() {
        let mut state = LoopingState::new("x", IntensityProfile::Full, Tone::Air);
        let err = protocol().advance(&mut state, "yes", ctx()).unwrap_err();
        assert!(matches!(err, LoopingError::InvalidPhase { .. }));
    }

    #[test]
    fn test_never_exceeds_budget_under_any_reply_sequence() {
        let replies = [
            "sort of",
            "no, I meant the house",
            "well, maybe something about my father and the farm",
            "yes",
            "",
            "not really",
            "hmm",
            "It's more like the weight of all of it",
        ];
        for profile in [IntensityProfile::Light, IntensityProfile::Full, IntensityProfile::Sacred] {
            for offset in 0..replies.len() {
                let mut state = started(profile);
                let mut steps = 0;
                while !state.is_terminal() {
                    let reply = replies[(offset + steps) % replies.len()];
                    protocol().advance(&mut state, reply, ctx()).unwrap();
                    assert!(state.loop_count <= state.max_loops, "{:?}", profile);
                    steps += 1;
                    assert!(steps <= (state.max_loops + 2) as usize, "no terminal state for {:?}", profile);
                }
            }
        }
    }

    #[test]
    fn test_abort_sets_terminal_phase() {
        let mut state = started(IntensityProfile::Full);
        protocol().abort(&mut state, LoopOutcome::Displaced);
        assert_eq!(state.phase, LoopPhase::Aborted);
        assert!(state.awaiting_since.is_none());
    }

    #[test]
    fn test_correction_content_extraction() {
        assert_eq!(correction_content("actually, I'm scared").as_deref(), Some("you're scared"));
        assert_eq!(correction_content("no, it's my sister I worry about").as_deref(), Some("it's your sister you worry about"));
        assert_eq!(correction_content("yes"), None);
    }
}
