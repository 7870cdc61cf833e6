//! Signal structures for the tone parser and clarity analyzer

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::Tone;

/// Raw elemental signals extracted from text (match density per word)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneSignals {
    /// anger/drive/must/fight
    pub fire: f64,
    /// feel/cry/miss/heart
    pub water: f64,
    /// body/work/money/home
    pub earth: f64,
    /// think/idea/wonder/understand
    pub air: f64,
    /// meaning/soul/purpose/sacred
    pub aether: f64,
}

impl ToneSignals {
    /// Create zero signals
    pub fn zero() -> Self {
        Self::default()
    }

    /// Signal for a given tone
    pub fn get(&self, tone: Tone) -> f64 {
        match tone {
            Tone::Fire => self.fire,
            Tone::Water => self.water,
            Tone::Earth => self.earth,
            Tone::Air => self.air,
            Tone::Aether => self.aether,
        }
    }

    /// Sum of all signals
    pub fn total(&self) -> f64 {
        self.fire + self.water + self.earth + self.air + self.aether
    }

    /// Strongest tone; ties resolve in `Tone::ALL` order. None when silent.
    pub fn dominant(&self) -> Option<Tone> {
        let mut best: Option<(Tone, f64)> = None;
        for tone in Tone::ALL {
            let value = self.get(tone);
            if value <= 0.0 {
                continue;
            }
            match best {
                Some((_, b)) if b >= value => {}
                _ => best = Some((tone, value)),
            }
        }
        best.map(|(t, _)| t)
    }
}

/// Computed tone reading with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneReading {
    /// Dominant tone, if any signal fired
    pub dominant: Option<Tone>,
    /// Overall affective intensity: 0.0-1.0
    pub intensity: f64,
    /// Share of the signal mass held by the dominant tone: 0.0-1.0
    pub dominance: f64,
    /// Raw signals
    pub signals: ToneSignals,
    /// Number of tonal keyword hits
    pub keyword_count: usize,
    /// Confidence based on text length (0.0-1.0)
    pub confidence: f64,
    /// When this was computed
    pub timestamp: DateTime<Utc>,
    /// Word count of input
    pub word_count: usize,
}

impl ToneReading {
    /// Reading for empty input
    pub fn silent() -> Self {
        Self {
            dominant: None,
            intensity: 0.0,
            dominance: 0.0,
            signals: ToneSignals::zero(),
            keyword_count: 0,
            confidence: 0.0,
            timestamp: Utc::now(),
            word_count: 0,
        }
    }
}

/// Inputs to the looping activation predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaritySignals {
    /// User explicitly asked to be reflected back / understood
    pub explicit_request: bool,
    /// User corrected an earlier understanding
    pub correction_detected: bool,
    /// Emotional intensity (0.0-1.0)
    pub emotional_intensity: f64,
    /// Meaning ambiguity (0.0-1.0)
    pub ambiguity: f64,
    /// Gap between what was said and what seems meant (0.0-1.0)
    pub essentiality_gap: f64,
    /// Clarity of the surface statement (0.0-1.0)
    pub semantic_clarity: f64,
}

impl ClaritySignals {
    /// Strongest trigger as a single [0,1] strength
    pub fn trigger_strength(&self) -> f64 {
        let explicit: f64 = if self.explicit_request || self.correction_detected { 1.0 } else { 0.0 };
        explicit
            .max(self.ambiguity)
            .max(self.essentiality_gap)
            .max(self.emotional_intensity)
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_none_when_silent() {
        assert_eq!(ToneSignals::zero().dominant(), None);
    }

    #[test]
    fn test_dominant_picks_strongest() {
        let signals = ToneSignals { water: 0.2, air: 0.4, ..ToneSignals::zero() };
        assert_eq!(signals.dominant(), Some(Tone::Air));
    }

    #[test]
    fn test_dominant_tie_uses_bank_order() {
        let signals = ToneSignals { earth: 0.3, fire: 0.3, ..ToneSignals::zero() };
        assert_eq!(signals.dominant(), Some(Tone::Fire));
    }

    #[test]
    fn test_trigger_strength_explicit_wins() {
        let signals = ClaritySignals { explicit_request: true, ambiguity: 0.2, ..Default::default() };
        assert_eq!(signals.trigger_strength(), 1.0);
    }
}
