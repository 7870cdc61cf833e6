//! Clarity analyzer: decides whether meaning needs a clarification loop

use lazy_static::lazy_static;
use regex::Regex;
use crate::core::tone_parser::ToneParser;
use crate::types::{ClaritySignals, ProfileThresholds};

lazy_static! {
    static ref RE_EXPLICIT_REQUEST: Regex = Regex::new(
        r"(?i)(do you (understand|get) (me|what i mean)|reflect (it |that |this )?back|help me understand what i mean|say (it|that) back|can you tell me what (i'm|i am) saying|what am i (really )?(trying to say|saying))"
    ).unwrap();

    static ref RE_CORRECTION: Regex = Regex::new(
        r"(?i)(\bno,? i meant\b|\bthat'?s not what i (meant|mean|said)\b|^\s*actually\b|\bnot quite\b|\bi didn'?t mean\b|\bwhat i meant (was|is)\b)"
    ).unwrap();

    static ref RE_HEDGE: Regex = Regex::new(
        r"(?i)\b(kind of|sort of|maybe|perhaps|i guess|i don'?t know|not sure|somehow|something like|or something|i suppose|whatever)\b|\.\.\.|…"
    ).unwrap();

    // Vague referents stand in for content the user has not named yet
    static ref RE_VAGUE: Regex = Regex::new(
        r"(?i)\b(it|this|that|things|stuff|everything|something)\b"
    ).unwrap();

    static ref RE_FILLER: Regex = Regex::new(
        r"(?i)\b(um+|uh+|like|you know|i mean|just|really|basically|literally|anyway|well|so)\b"
    ).unwrap();
}

/// Signals for the looping activation predicate
#[derive(Debug, Default)]
pub struct ClarityAnalyzer {
    tone: ToneParser,
}

impl ClarityAnalyzer {
    pub fn new() -> Self {
        Self { tone: ToneParser::new() }
    }

    /// Analyze an utterance; `reported_intensity` overrides the tone reading when given
    pub fn analyze(&self, text: &str, reported_intensity: Option<f64>) -> ClaritySignals {
        let text = text.trim();
        if text.is_empty() {
            return ClaritySignals::default();
        }

        let words = text.split_whitespace().count().max(1) as f64;
        let hedges = RE_HEDGE.find_iter(text).count() as f64;
        let vague = RE_VAGUE.find_iter(text).count() as f64;
        let fillers = RE_FILLER.find_iter(text).count() as f64;

        let emotional_intensity = reported_intensity
            .unwrap_or_else(|| self.tone.parse(text).intensity)
            .clamp(0.0, 1.0);

        // Each hedge is a strong ambiguity cue; vagueness only counts by density
        let ambiguity = (hedges * 0.35 + (vague / words) * 1.5).clamp(0.0, 1.0);

        let semantic_clarity = if words < 4.0 {
            0.3
        } else {
            (1.0 - fillers / words).clamp(0.0, 1.0)
        };

        // Emotionally loaded but semantically vague: said and meant diverge
        let essentiality_gap = (emotional_intensity * (1.0 - semantic_clarity)
            + ambiguity * 0.5)
            .clamp(0.0, 1.0);

        ClaritySignals {
            explicit_request: RE_EXPLICIT_REQUEST.is_match(text),
            correction_detected: RE_CORRECTION.is_match(text),
            emotional_intensity,
            ambiguity,
            essentiality_gap,
            semantic_clarity,
        }
    }

    /// Looping activation predicate under a profile
    pub fn should_activate(signals: &ClaritySignals, thresholds: &ProfileThresholds) -> bool {
        signals.explicit_request
            || signals.correction_detected
            || signals.emotional_intensity > thresholds.emotional_trigger
            || signals.ambiguity > thresholds.ambiguity_trigger
            || signals.essentiality_gap > 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntensityProfile;

    #[test]
    fn test_explicit_request_detected() {
        let signals = ClarityAnalyzer::new()
            .analyze("Can you reflect that back to me? I'm not sure I'm making sense.", None);
        assert!(signals.explicit_request);
        assert!(ClarityAnalyzer::should_activate(&signals, &IntensityProfile::Light.thresholds()));
    }

    #[test]
    fn test_correction_detected() {
        let signals = ClarityAnalyzer::new().analyze("No, I meant the job, not the move", None);
        assert!(signals.correction_detected);
    }

    #[test]
    fn test_hedged_text_is_ambiguous() {
        let signals = ClarityAnalyzer::new()
            .analyze("I kind of feel like maybe it's something, I don't know...", None);
        assert!(signals.ambiguity > 0.6, "ambiguity {}", signals.ambiguity);
        assert!(ClarityAnalyzer::should_activate(&signals, &IntensityProfile::Full.thresholds()));
    }

    #[test]
    fn test_plain_statement_does_not_activate() {
        let signals = ClarityAnalyzer::new()
            .analyze("The train to Utrecht leaves at nine tomorrow morning.", Some(0.1));
        assert!(!signals.explicit_request);
        assert!(!signals.correction_detected);
        assert!(!ClarityAnalyzer::should_activate(&signals, &IntensityProfile::Full.thresholds()));
    }

    #[test]
    fn test_short_text_low_clarity() {
        let signals = ClarityAnalyzer::new().analyze("whatever", None);
        assert_eq!(signals.semantic_clarity, 0.3);
    }

    #[test]
    fn test_reported_intensity_wins() {
        let signals = ClarityAnalyzer::new().analyze("The weather is fine today really", Some(0.9));
        assert_eq!(signals.emotional_intensity, 0.9);
        assert!(ClarityAnalyzer::should_activate(&signals, &IntensityProfile::Full.thresholds()));
    }
}
