//! Convergence tracker: scores how close the essential-meaning guess is
//!
//! Five sub-scores feed a fixed-weight overall (see `ConvergenceMetrics`).
//! Only `should_continue_looping` is binding; the pattern is advisory.

use lazy_static::lazy_static;
use regex::Regex;
use crate::core::tone_parser::ToneParser;
use crate::types::{
    ConvergenceMetrics, ConvergencePattern, LoopingState, ProfileThresholds, RecommendedAction,
    SpiralPhase, Tone,
};
use crate::CV_FLATTENING_DELTA;

lazy_static! {
    // =========================================================================
    // Confirmation tiers, checked in this order
    // =========================================================================
    static ref RE_PARTIAL: Regex = Regex::new(
        r"(?i)\b(not quite|sort of|kind of|partly|partially|almost|somewhat|a bit|in a way)\b"
    ).unwrap();
    static ref RE_STRONG_NEGATIVE: Regex = Regex::new(
        r"(?i)\b(no|nope|wrong|that'?s not it|not at all|not really|that'?s not what i)\b"
    ).unwrap();
    static ref RE_STRONG_POSITIVE: Regex = Regex::new(
        r"(?i)\b(exactly|that'?s it|perfect|precisely|spot on|absolutely|you got it)\b"
    ).unwrap();
    static ref RE_POSITIVE: Regex = Regex::new(
        r"(?i)\b(yes|yeah|yep|right|true|close|correct|mostly)\b"
    ).unwrap();

    static ref RE_NEGATION: Regex = Regex::new(
        r"(?i)\b(no|not|isn'?t|wasn'?t|don'?t|doesn'?t|never|wrong)\b"
    ).unwrap();

    // The user is going deeper rather than sideways
    static ref RE_DEPTH_MARKER: Regex = Regex::new(
        r"(?i)\b(deeper|underneath|really|truly|heart|core|actually feel|inside)\b"
    ).unwrap();
}

/// Semantic alignment never exceeds this while the feedback negates
const NEGATION_CAP: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    thresholds: ProfileThresholds,
}

impl ConvergenceTracker {
    pub fn new(thresholds: ProfileThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ProfileThresholds {
        &self.thresholds
    }

    /// Score the current guess against optional reply feedback
    pub fn measure(
        &self,
        state: &LoopingState,
        feedback: Option<&str>,
        session_tone: Option<Tone>,
        spiral_phase: SpiralPhase,
    ) -> ConvergenceMetrics {
        let parser = ToneParser::new();
        let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
        let confirmation = user_confirmation(feedback);

        // Semantic alignment
        let adjustment_boost = (state.adjustment_history.len() as f64 * 0.05).min(0.2);
        let mut semantic = 0.5 + 0.8 * (confirmation - 0.5) + adjustment_boost;
        if feedback.is_some_and(|f| RE_NEGATION.is_match(f)) {
            semantic = semantic.min(NEGATION_CAP);
        }

        // Emotional resonance
        let felt_text = feedback.unwrap_or(&state.surface_capture);
        let felt = parser.parse(felt_text);
        let markers = RE_DEPTH_MARKER.find_iter(felt_text).count() as f64;
        let emotional = 0.3 + 0.5 * felt.intensity + (markers * 0.1).min(0.2);

        // Archetypal clarity
        let surface = parser.parse(&state.surface_capture);
        let pattern_confidence = if surface.dominant.is_some() { surface.dominance } else { 0.5 };
        let archetypal = pattern_confidence * spiral_phase.clarity_multiplier();

        // Tonal coherence
        let session_tone = session_tone.unwrap_or(state.tone);
        let match_bonus = if felt.dominant == Some(session_tone) { 0.2 } else { 0.0 };
        let tonal = felt.intensity * 0.6
            + (felt.keyword_count as f64 * 0.05).min(0.2)
            + match_bonus;

        ConvergenceMetrics::new(semantic, emotional, archetypal, tonal, confirmation)
    }

    /// Binding stop rule for the loop
    pub fn should_continue_looping(
        &self,
        metrics: &ConvergenceMetrics,
        history: &[f64],
        loop_count: u32,
        max_loops: u32,
    ) -> bool {
        if loop_count >= max_loops {
            return false;
        }
        if metrics.overall >= self.thresholds.optimal {
            return false;
        }
        !is_flattening(history, loop_count)
    }

    pub fn recommended_action(&self, metrics: &ConvergenceMetrics) -> RecommendedAction {
        let overall = metrics.overall;
        if overall >= self.thresholds.optimal {
            RecommendedAction::Complete
        } else if overall >= self.thresholds.sufficient {
            RecommendedAction::Transition
        } else if overall >= self.thresholds.minimum {
            RecommendedAction::Deepen
        } else {
            RecommendedAction::Loop
        }
    }
}

/// Keyword-tiered confirmation score, 0.5 without feedback
pub fn user_confirmation(feedback: Option<&str>) -> f64 {
    let Some(text) = feedback else {
        return 0.5;
    };
    if RE_PARTIAL.is_match(text) {
        0.25
    } else if RE_STRONG_NEGATIVE.is_match(text) {
        0.0
    } else if RE_STRONG_POSITIVE.is_match(text) {
        1.0
    } else if RE_POSITIVE.is_match(text) {
        0.75
    } else {
        0.5
    }
}

/// Spread over the last three points below the flattening delta, after two iterations
pub fn is_flattening(history: &[f64], loop_count: u32) -> bool {
    if history.len() < 3 || loop_count < 2 {
        return false;
    }
    let last = &history[history.len() - 3..];
    let max = last.iter().cloned().fold(f64::MIN, f64::max);
    let min = last.iter().cloned().fold(f64::MAX, f64::min);
    max - min < CV_FLATTENING_DELTA
}

/// Advisory shape of the last three points
pub fn detect_pattern(history: &[f64]) -> ConvergencePattern {
    if history.len() < 3 {
        return ConvergencePattern::Insufficient;
    }
    let last = &history[history.len() - 3..];
    let (a, b, c) = (last[0], last[1], last[2]);
    let rising = a < b && b < c;
    let falling = a > b && b > c;
    let delta = c - a;

    if rising && delta >= CV_FLATTENING_DELTA {
        return ConvergencePattern::Improving;
    }
    if falling && -delta >= CV_FLATTENING_DELTA {
        return ConvergencePattern::Declining;
    }

    let mean = (a + b + c) / 3.0;
    let variance = ((a - mean).powi(2) + (b - mean).powi(2) + (c - mean).powi(2)) / 3.0;
    if variance < 0.01 {
        return ConvergencePattern::Plateaued;
    }
    if variance > 0.1 && !rising && !falling {
        return ConvergencePattern::Oscillating;
    }

    if c > a {
        ConvergencePattern::Improving
    } else if c < a {
        ConvergencePattern::Declining
    } else {
        ConvergencePattern::Plateaued
    }
}

// =============================================================================
// TESTS
// =============================================================================
