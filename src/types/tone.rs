//! Tone, depth and evolution-phase definitions

use serde::{Deserialize, Serialize};

/// Dominant affective register of an utterance (elemental lens)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Passion, drive, anger, urgency of will
    Fire,
    /// Feeling, grief, tenderness, flow
    Water,
    /// Body, practicalities, stability, routine
    Earth,
    /// Thought, ideas, analysis, perspective
    Air,
    /// Meaning, spirit, integration
    Aether,
}

impl Tone {
    /// All tones in bank order
    pub const ALL: [Tone; 5] = [Tone::Fire, Tone::Water, Tone::Earth, Tone::Air, Tone::Aether];

    /// Stable index used for phrase-bank lookup
    pub fn index(&self) -> usize {
        match self {
            Tone::Fire => 0,
            Tone::Water => 1,
            Tone::Earth => 2,
            Tone::Air => 3,
            Tone::Aether => 4,
        }
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            Tone::Fire => "\x1b[31m",   // Red
            Tone::Water => "\x1b[34m",  // Blue
            Tone::Earth => "\x1b[33m",  // Yellow
            Tone::Air => "\x1b[36m",    // Cyan
            Tone::Aether => "\x1b[35m", // Magenta
        }
    }

    /// Parse a loose tone name (used for preferences and config)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fire" => Some(Tone::Fire),
            "water" => Some(Tone::Water),
            "earth" => Some(Tone::Earth),
            "air" => Some(Tone::Air),
            "aether" => Some(Tone::Aether),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tone::Fire => "fire",
            Tone::Water => "water",
            Tone::Earth => "earth",
            Tone::Air => "air",
            Tone::Aether => "aether",
        };
        write!(f, "{}", name)
    }
}

/// Conversational depth derived from exchange count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Surface,
    Moderate,
    Deep,
}

impl Depth {
    /// Depth for a given number of completed exchanges: <2 surface, >5 deep
    pub fn from_exchange_count(count: u64) -> Self {
        if count < 2 {
            Depth::Surface
        } else if count > 5 {
            Depth::Deep
        } else {
            Depth::Moderate
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Depth::Surface => "surface",
            Depth::Moderate => "moderate",
            Depth::Deep => "deep",
        };
        write!(f, "{}", name)
    }
}

/// Evolution phase of the user's process; scales archetypal clarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpiralPhase {
    #[default]
    Initiation,
    Exploration,
    Challenge,
    Transformation,
    Integration,
    Mastery,
    Transcendence,
}

impl SpiralPhase {
    /// Multiplier applied to archetypal pattern confidence
    pub fn clarity_multiplier(&self) -> f64 {
        match self {
            SpiralPhase::Initiation => 0.8,
            SpiralPhase::Exploration => 0.85,
            SpiralPhase::Challenge => 0.9,
            SpiralPhase::Transformation => 1.0,
            SpiralPhase::Integration => 1.1,
            SpiralPhase::Mastery => 1.15,
            SpiralPhase::Transcendence => 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_thresholds() {
        let expected = [
            (0, Depth::Surface),
            (1, Depth::Surface),
            (2, Depth::Moderate),
            (5, Depth::Moderate),
            (6, Depth::Deep),
        ];
        for (count, depth) in expected {
            assert_eq!(Depth::from_exchange_count(count), depth, "count {}", count);
        }
    }

    #[test]
    fn test_tone_parse_roundtrip_names() {
        for tone in Tone::ALL {
            assert_eq!(Tone::parse(&tone.to_string()), Some(tone));
        }
        assert_eq!(Tone::parse("  FIRE "), Some(Tone::Fire));
        assert_eq!(Tone::parse("plasma"), None);
    }

    #[test]
    fn test_tone_indices_are_distinct() {
        let mut seen: Vec<usize> = Tone::ALL.iter().map(|t| t.index()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), Tone::ALL.len());
    }
}
