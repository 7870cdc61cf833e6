//! Temple interrupt gate
//!
//! Narrower than the catastrophic gate: it decides whether this turn may
//! loop at all, and pre-empts a running loop on boundary, time, help or
//! emergency phrasing.

use lazy_static::lazy_static;
use regex::Regex;
use crate::config::InterruptConfig;
use crate::core::detectors::BOUNDARY_RESPONSE;
use crate::types::{ClaritySignals, InterruptCategory, InterruptOutcome, LoopPermission, ProtocolConfidence};
use crate::{
    PC_FULL_LOOP_ABOVE, PC_WEIGHT_CULTURAL, PC_WEIGHT_EMOTIONAL, PC_WEIGHT_SEMANTIC,
    PC_WEIGHT_TRIGGER, PC_WITNESS_ONLY_BELOW,
};

lazy_static! {
    // Checked in this order
    static ref PATTERNS: Vec<(InterruptCategory, Regex)> = vec![
        (InterruptCategory::Emergency, Regex::new(
            r"(?i)\b(this is an emergency|(it'?s|it is) an emergency|(we|i) have an emergency|there'?s an emergency|i need help now|urgent help)\b|^\W*emergency\b"
        ).unwrap()),
        (InterruptCategory::Boundary, Regex::new(
            r"(?i)\b(stop asking|no more questions|leave me alone|just listen|stop repeating|stop reflecting|that'?s enough|enough now|enough questions|back off|drop it)\b"
        ).unwrap()),
        (InterruptCategory::Time, Regex::new(
            r"(?i)\b(i (have to|need to|gotta|must) go|got to run|gotta run|no time|running late|in a hurry|short on time)\b"
        ).unwrap()),
        // Help phrasing must open the utterance; "I don't know what should I do" is not a request
        (InterruptCategory::Help, Regex::new(
            r"(?i)^\W*((so|ok|okay|well|please|honestly|look)\b[\s,.!-]*)*(just tell me what to do|what should i do|give me (some )?advice|i need (your )?advice|can you help me (with|decide))\b"
        ).unwrap()),
    ];

    // "not an emergency", "isn't an emergency"
    static ref RE_NEGATED_EMERGENCY: Regex = Regex::new(
        r"(?i)\b(not|isn'?t|wasn'?t|no)\s+(really\s+)?(an?\s+)?(real\s+)?emergency\b"
    ).unwrap();
}

/// Cultural certainty when the locale is outside the phrase banks' language
const FOREIGN_LOCALE_CERTAINTY: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct TempleInterruptGate {
    config: InterruptConfig,
}

impl Default for TempleInterruptGate {
    fn default() -> Self {
        Self::new(InterruptConfig::default())
    }
}

impl TempleInterruptGate {
    pub fn new(config: InterruptConfig) -> Self {
        Self { config }
    }

    /// Does this utterance pre-empt looping?
    pub fn evaluate(&self, utterance: &str) -> InterruptOutcome {
        let negated_emergency = RE_NEGATED_EMERGENCY.is_match(utterance);
        let Some(category) = PATTERNS
            .iter()
            .filter(|(category, _)| !(negated_emergency && *category == InterruptCategory::Emergency))
            .find(|(_, re)| re.is_match(utterance))
            .map(|(category, _)| *category)
        else {
            return InterruptOutcome::none();
        };

        let response = match category {
            InterruptCategory::Emergency => {
                "Let's set everything else aside. If you're in danger, please contact emergency services now. What do you need right now?"
            }
            InterruptCategory::Boundary => BOUNDARY_RESPONSE,
            InterruptCategory::Time => {
                "Understood, let's keep this short. We can come back to it whenever you have time."
            }
            InterruptCategory::Help => {
                "Let's move to something practical. What would be most helpful right now?"
            }
        };

        InterruptOutcome {
            interrupted: true,
            category: Some(category),
            response: response.to_string(),
            next_state: Some(category.next_state()),
        }
    }

    /// Weighted confidence that looping is appropriate, decayed per prior attempt
    pub fn protocol_confidence(
        &self,
        signals: &ClaritySignals,
        emotional_intensity: f64,
        locale: &str,
        prior_attempts: u32,
    ) -> ProtocolConfidence {
        let trigger_strength = signals.trigger_strength();
        let semantic_clarity = signals.semantic_clarity.clamp(0.0, 1.0);
        let emotional_stability = (1.0 - emotional_intensity).clamp(0.0, 1.0);
        let cultural_certainty = if locale.trim().to_ascii_lowercase().starts_with("en") {
            1.0
        } else {
            FOREIGN_LOCALE_CERTAINTY
        };

        let raw = PC_WEIGHT_TRIGGER * trigger_strength
            + PC_WEIGHT_SEMANTIC * semantic_clarity
            + PC_WEIGHT_EMOTIONAL * emotional_stability
            + PC_WEIGHT_CULTURAL * cultural_certainty;
        let score = (raw * self.config.attempt_decay.powi(prior_attempts as i32)).clamp(0.0, 1.0);

        ProtocolConfidence {
            trigger_strength,
            semantic_clarity,
            emotional_stability,
            cultural_certainty,
            prior_attempts,
            score,
            permission: permission_for(score),
        }
    }
}

/// Map a protocol-confidence score to a loop permission
pub fn permission_for(score: f64) -> LoopPermission {
    if score < PC_WITNESS_ONLY_BELOW {
        LoopPermission::WitnessOnly
    } else if score > PC_FULL_LOOP_ABOVE {
        LoopPermission::Full
    } else {
        LoopPermission::LightTouch
    }
}
