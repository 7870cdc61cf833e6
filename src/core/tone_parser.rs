//! Tone parser: reads the elemental register of an utterance
//!
//! Five keyword families, counts normalized by word count. The dominant
//! family is the tone lens used for phrasing and convergence scoring.

use lazy_static::lazy_static;
use regex::Regex;
use chrono::Utc;
use crate::types::{Tone, ToneReading, ToneSignals};

lazy_static! {
    // =========================================================================
    // Fire: will, anger, drive
    // =========================================================================
    static ref RE_FIRE: Regex = Regex::new(
        r"(?i)\b(angry|anger|furious|rage|mad|frustrated|frustrating|fight|fighting|must|burn|burning|drive|driven|push|pushing|fed up|hate|passion|passionate|determined|want)\b"
    ).unwrap();

    // =========================================================================
    // Water: feeling, grief, tenderness
    // =========================================================================
    static ref RE_WATER: Regex = Regex::new(
        r"(?i)\b(feel|feeling|feelings|felt|sad|sadness|cry|crying|cried|tears|miss|missing|lonely|alone|hurt|hurts|heart|grief|grieving|love|loved|loss|lost|tender|afraid|scared)\b"
    ).unwrap();

    // =========================================================================
    // Earth: body, practicalities, routine
    // =========================================================================
    static ref RE_EARTH: Regex = Regex::new(
        r"(?i)\b(work|job|money|rent|bills|home|house|body|tired|exhausted|sleep|eat|eating|routine|practical|plan|schedule|health|family|kids|stable|ground|grounded)\b"
    ).unwrap();

    // =========================================================================
    // Air: thought, ideas, analysis
    // =========================================================================
    static ref RE_AIR: Regex = Regex::new(
        r"(?i)\b(think|thinking|thought|thoughts|idea|ideas|wonder|wondering|understand|figure out|confused|confusing|question|questions|analyze|reason|logic|perspective|curious|decide|decision)\b"
    ).unwrap();

    // =========================================================================
    // Aether: meaning, spirit, integration
    // =========================================================================
    static ref RE_AETHER: Regex = Regex::new(
        r"(?i)\b(meaning|meaningful|purpose|soul|spirit|spiritual|sacred|divine|universe|whole|wholeness|connected|connection|calling|faith|presence|truth|essence|transcend|becoming)\b"
    ).unwrap();

    // Amplifiers push intensity up independently of which family fired
    static ref RE_AMPLIFIER: Regex = Regex::new(
        r"(?i)\b(so|very|really|extremely|completely|totally|always|never|can't|cannot)\b|!"
    ).unwrap();
}

/// Tone parser for elemental signals
#[derive(Debug, Default)]
pub struct ToneParser;

impl ToneParser {
    /// Create new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse text and return a reading with full signal breakdown
    pub fn parse(&self, text: &str) -> ToneReading {
        let text = text.trim();

        if text.is_empty() {
            return ToneReading::silent();
        }

        let word_count = text.split_whitespace().count().max(1);
        let wc = word_count as f64;

        let counts = [
            count_matches(&RE_FIRE, text),
            count_matches(&RE_WATER, text),
            count_matches(&RE_EARTH, text),
            count_matches(&RE_AIR, text),
            count_matches(&RE_AETHER, text),
        ];
        let keyword_count = counts.iter().sum::<usize>();

        let signals = ToneSignals {
            fire: counts[0] as f64 / wc,
            water: counts[1] as f64 / wc,
            earth: counts[2] as f64 / wc,
            air: counts[3] as f64 / wc,
            aether: counts[4] as f64 / wc,
        };

        let dominant = signals.dominant();
        let total = signals.total();
        let dominance = match dominant {
            Some(tone) if total > 0.0 => signals.get(tone) / total,
            _ => 0.0,
        };

        // Density saturates quickly: 1 hit in 4 words is already strong
        let amplifiers = count_matches(&RE_AMPLIFIER, text) as f64;
        let intensity = ((total * 3.0) + (amplifiers / wc)).clamp(0.0, 1.0);

        // More words = more reliable
        let confidence = (word_count as f64 / 50.0).min(1.0);

        ToneReading {
            dominant,
            intensity,
            dominance,
            signals,
            keyword_count,
            confidence,
            timestamp: Utc::now(),
            word_count,
        }
    }

    /// Quick parse - dominant tone only
    pub fn dominant(&self, text: &str) -> Option<Tone> {
        self.parse(text).dominant
    }
}

/// Count regex matches in text
fn count_matches(regex: &Regex, text: &str) -> usize {
    regex.find_iter(text).count()
}

// =============================================================================
// TESTS
// =============================================================================
