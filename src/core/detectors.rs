//! Built-in keyword detectors
//!
//! Simple strategy implementations of `SignalDetector`. Each one looks at
//! the utterance (and sometimes the context) and bids with a fixed script
//! or a tone-lensed directive.

use std::sync::Arc;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use crate::core::clarity::ClarityAnalyzer;
use crate::core::detector::SignalDetector;
use crate::core::phrases::{self, PhraseKind};
use crate::core::safety::CatastrophicGate;
use crate::core::tone_parser::ToneParser;
use crate::error::DetectorError;
use crate::types::{Claim, ClaimMetadata, SubsystemId, Tone, TurnContext, UrgencyLevel};

lazy_static! {
    static ref RE_BOUNDARY: Regex = Regex::new(
        r"(?i)\b(stop asking|no more questions|leave me alone|just listen|back off|drop it|i don'?t want to talk about (it|this|that)|i need (some )?space|that'?s enough|enough questions|stop (it|this|that) now)\b"
    ).unwrap();

    static ref RE_URGENCY_HIGH: Regex = Regex::new(
        r"(?i)\b(urgent|urgently|emergency|asap|immediately|right now|right away)\b"
    ).unwrap();

    static ref RE_URGENCY_MEDIUM: Regex = Regex::new(
        r"(?i)\b(quickly|hurry|deadline|running late|running out of time|no time|soon as possible|need help (with|now))\b"
    ).unwrap();

    static ref RE_PAUSE: Regex = Regex::new(
        r"(?i)(\blet me think\b|\bi need a (moment|minute|second)\b|\bgive me a (moment|minute|second)\b|^\s*h+m+\W*$|^\s*(\.\.\.|…)\s*$|\bi'?m not sure how to (say|put) (it|this)\b|\bhold on\b)"
    ).unwrap();

    static ref RE_NARRATIVE: Regex = Regex::new(
        r"(?i)\b(yesterday|last (week|night|month|year)|when i was|i remember|it started|it happened|so then|and then|once upon|back when|the other day)\b"
    ).unwrap();
}

// =============================================================================
// CATASTROPHIC
// =============================================================================

/// Adapter exposing the catastrophic gate as a detector
pub struct CatastrophicDetector {
    gate: Arc<CatastrophicGate>,
}

impl CatastrophicDetector {
    pub fn new(gate: Arc<CatastrophicGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl SignalDetector for CatastrophicDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::CatastrophicGuard
    }

    async fn detect(&self, utterance: &str, ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        if ctx.safety_cleared {
            return Ok(None);
        }
        let assessment = self.gate.assess(utterance, &ctx.preferences.locale);
        if !assessment.detected {
            return Ok(None);
        }
        let reason = assessment
            .category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "catastrophic".to_string());
        Ok(Some(
            Claim::new(self.id(), assessment.confidence, assessment.response, reason)
                .with_urgency(UrgencyLevel::Critical),
        ))
    }
}

// =============================================================================
// EXPLICIT BOUNDARY
// =============================================================================

pub const BOUNDARY_RESPONSE: &str =
    "Of course. I'll stop here. I'm here whenever you want to continue.";

/// Explicit stop / "leave me alone"
#[derive(Debug, Default)]
pub struct BoundaryDetector;

#[async_trait]
impl SignalDetector for BoundaryDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::ExplicitBoundary
    }

    async fn detect(&self, utterance: &str, _ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        if !RE_BOUNDARY.is_match(utterance) {
            return Ok(None);
        }
        Ok(Some(
            Claim::new(self.id(), 0.95, BOUNDARY_RESPONSE, "explicit boundary phrasing")
                .with_urgency(UrgencyLevel::High),
        ))
    }
}

// =============================================================================
// URGENCY
// =============================================================================

#[derive(Debug, Default)]
pub struct UrgencyDetector;

#[async_trait]
impl SignalDetector for UrgencyDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::Urgency
    }

    async fn detect(&self, utterance: &str, _ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        let (confidence, urgency) = if RE_URGENCY_HIGH.is_match(utterance) {
            (0.8, UrgencyLevel::High)
        } else if RE_URGENCY_MEDIUM.is_match(utterance) {
            (0.6, UrgencyLevel::Medium)
        } else {
            return Ok(None);
        };
        Ok(Some(
            Claim::new(
                self.id(),
                confidence,
                "I hear the urgency. Let's focus on what matters most right now. What's the first thing you need?",
                "time pressure",
            )
            .with_urgency(urgency),
        ))
    }
}

// =============================================================================
// CLARIFICATION
// =============================================================================

/// Bids when meaning looks ambiguous enough to loop on
#[derive(Debug, Default)]
pub struct ClarificationDetector {
    analyzer: ClarityAnalyzer,
}

#[async_trait]
impl SignalDetector for ClarificationDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::Clarification
    }

    async fn detect(&self, utterance: &str, ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        let reported = (ctx.emotional_intensity > 0.0).then_some(ctx.emotional_intensity);
        let signals = self.analyzer.analyze(utterance, reported);
        let thresholds = ctx.preferences.looping_intensity.thresholds();
        if !ClarityAnalyzer::should_activate(&signals, &thresholds) {
            return Ok(None);
        }

        let confidence = 0.5 + 0.4 * signals.trigger_strength();
        let reason = if signals.explicit_request {
            "explicit reflection request"
        } else if signals.correction_detected {
            "correction detected"
        } else {
            "meaning ambiguous"
        };
        Ok(Some(Claim::new(
            self.id(),
            confidence,
            "Let me make sure I understand you.",
            reason,
        )))
    }
}

// =============================================================================
// CONTEMPLATIVE PAUSE
// =============================================================================

pub const PAUSE_RESPONSE: &str = "Take your time. There's no rush.";

#[derive(Debug, Default)]
pub struct ContemplativePauseDetector;

#[async_trait]
impl SignalDetector for ContemplativePauseDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::ContemplativePause
    }

    async fn detect(&self, utterance: &str, _ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        if !RE_PAUSE.is_match(utterance) {
            return Ok(None);
        }
        Ok(Some(Claim::new(self.id(), 0.7, PAUSE_RESPONSE, "contemplative pause")))
    }
}

// =============================================================================
// TONAL RESONANCE
// =============================================================================

/// Always contributes a tone layer when a tone is readable
#[derive(Debug, Default)]
pub struct ToneResonanceDetector {
    parser: ToneParser,
}

#[async_trait]
impl SignalDetector for ToneResonanceDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::TonalResonance
    }

    async fn detect(&self, utterance: &str, ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        let reading = self.parser.parse(utterance);
        let Some(tone) = reading.dominant else {
            return Ok(None);
        };
        let confidence = (0.3 + 0.5 * reading.intensity * reading.dominance).min(0.8);
        let response = phrases::select(tone, PhraseKind::Witness, ctx.exchange_count as u32);
        Ok(Some(
            Claim::new(self.id(), confidence, response, format!("{} register", tone))
                .with_metadata(ClaimMetadata {
                    tone: Some(tone),
                    urgency: UrgencyLevel::Low,
                    depth: Some(ctx.depth),
                }),
        ))
    }
}

// =============================================================================
// NARRATIVE
// =============================================================================

/// Story-telling: invite the user to continue
#[derive(Debug, Default)]
pub struct NarrativeDetector;

#[async_trait]
impl SignalDetector for NarrativeDetector {
    fn id(&self) -> SubsystemId {
        SubsystemId::Narrative
    }

    async fn detect(&self, utterance: &str, ctx: &TurnContext) -> Result<Option<Claim>, DetectorError> {
        let markers = RE_NARRATIVE.find_iter(utterance).count();
        let words = utterance.split_whitespace().count();
        let confidence = match (markers, words) {
            (0, w) if w >= 25 => 0.45,
            (0, _) => return Ok(None),
            (1, _) => 0.55,
            _ => 0.65,
        };
        let tone = ctx.current_tone.unwrap_or(Tone::Aether);
        let response = match tone {
            Tone::Earth => "What happened next?",
            Tone::Water => "Tell me more about how that was for you.",
            _ => "Tell me more about what happened.",
        };
        Ok(Some(Claim::new(self.id(), confidence, response, "story in progress")))
    }
}

/// Built-in detector set, catastrophic first
pub fn default_detectors(gate: Arc<CatastrophicGate>) -> Vec<Arc<dyn SignalDetector>> {
    vec![
        Arc::new(CatastrophicDetector::new(gate)),
        Arc::new(BoundaryDetector),
        Arc::new(UrgencyDetector),
        Arc::new(ClarificationDetector::default()),
        Arc::new(ContemplativePauseDetector),
        Arc::new(ToneResonanceDetector::default()),
        Arc::new(NarrativeDetector),
    ]
}

// =============================================================================
// TESTS
// =============================================================================
