//! Reason codes for decision paths and protocol transitions

use serde::{Deserialize, Serialize};

/// Reason codes recorded in every decision path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // R1xx: Gates
    // =========================================================================
    /// Catastrophic keyword hit, everything else skipped
    R101_CATASTROPHIC_OVERRIDE,
    /// Catastrophic contextual-pattern hit
    R102_CATASTROPHIC_CONTEXTUAL,
    /// Interrupt gate: explicit boundary
    R111_INTERRUPT_BOUNDARY,
    /// Interrupt gate: time pressure
    R112_INTERRUPT_TIME,
    /// Interrupt gate: direct help request
    R113_INTERRUPT_HELP,
    /// Interrupt gate: emergency phrasing
    R114_INTERRUPT_EMERGENCY,

    // =========================================================================
    // R2xx: Resolution
    // =========================================================================
    /// Claims sorted by priority then confidence
    R201_PRIORITY_SORTED,
    /// First confident claim took the lead
    R202_CONFIDENT_LEADER,
    /// No confident claim, highest confidence took the lead
    R203_LOW_CONFIDENCE_FALLBACK,
    /// Empty claim set, fallback synthesized
    R204_EMPTY_CLAIM_SET,
    /// Tonal resonance should be blended into the leader's response
    R205_TONE_BLEND_REQUESTED,
    /// Governor forced the default fallback
    R206_GOVERNOR_OVERRIDE,

    // =========================================================================
    // R3xx: Looping
    // =========================================================================
    R301_LOOP_STARTED,
    R302_LOOP_CONTINUED,
    R303_LOOP_TRANSITIONED,
    R304_LOOP_ABORTED,
    /// Protocol confidence too low, witness only
    R305_LOOP_SUPPRESSED_WITNESS,
    /// Protocol confidence moderate, single light touch
    R306_LOOP_LIGHT_TOUCH,
    /// Internal looping failure, degraded to witness
    R307_LOOP_FAILURE,
    /// Another subsystem took the lead mid-loop
    R308_LOOP_DISPLACED,

    // =========================================================================
    // R4xx: Recovery
    // =========================================================================
    R401_ORCHESTRATION_RECOVERED,
    R402_SAFETY_GATE_FAILURE,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::R101_CATASTROPHIC_OVERRIDE => "R101_CATASTROPHIC_OVERRIDE",
            Self::R102_CATASTROPHIC_CONTEXTUAL => "R102_CATASTROPHIC_CONTEXTUAL",
            Self::R111_INTERRUPT_BOUNDARY => "R111_INTERRUPT_BOUNDARY",
            Self::R112_INTERRUPT_TIME => "R112_INTERRUPT_TIME",
            Self::R113_INTERRUPT_HELP => "R113_INTERRUPT_HELP",
            Self::R114_INTERRUPT_EMERGENCY => "R114_INTERRUPT_EMERGENCY",
            Self::R201_PRIORITY_SORTED => "R201_PRIORITY_SORTED",
            Self::R202_CONFIDENT_LEADER => "R202_CONFIDENT_LEADER",
            Self::R203_LOW_CONFIDENCE_FALLBACK => "R203_LOW_CONFIDENCE_FALLBACK",
            Self::R204_EMPTY_CLAIM_SET => "R204_EMPTY_CLAIM_SET",
            Self::R205_TONE_BLEND_REQUESTED => "R205_TONE_BLEND_REQUESTED",
            Self::R206_GOVERNOR_OVERRIDE => "R206_GOVERNOR_OVERRIDE",
            Self::R301_LOOP_STARTED => "R301_LOOP_STARTED",
            Self::R302_LOOP_CONTINUED => "R302_LOOP_CONTINUED",
            Self::R303_LOOP_TRANSITIONED => "R303_LOOP_TRANSITIONED",
            Self::R304_LOOP_ABORTED => "R304_LOOP_ABORTED",
            Self::R305_LOOP_SUPPRESSED_WITNESS => "R305_LOOP_SUPPRESSED_WITNESS",
            Self::R306_LOOP_LIGHT_TOUCH => "R306_LOOP_LIGHT_TOUCH",
            Self::R307_LOOP_FAILURE => "R307_LOOP_FAILURE",
            Self::R308_LOOP_DISPLACED => "R308_LOOP_DISPLACED",
            Self::R401_ORCHESTRATION_RECOVERED => "R401_ORCHESTRATION_RECOVERED",
            Self::R402_SAFETY_GATE_FAILURE => "R402_SAFETY_GATE_FAILURE",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::R101_CATASTROPHIC_OVERRIDE => "catastrophic override",
            Self::R102_CATASTROPHIC_CONTEXTUAL => "catastrophic contextual match",
            Self::R111_INTERRUPT_BOUNDARY => "explicit boundary interrupt",
            Self::R112_INTERRUPT_TIME => "time pressure interrupt",
            Self::R113_INTERRUPT_HELP => "direct help request interrupt",
            Self::R114_INTERRUPT_EMERGENCY => "emergency interrupt",
            Self::R201_PRIORITY_SORTED => "claims sorted by priority",
            Self::R202_CONFIDENT_LEADER => "confident leader selected",
            Self::R203_LOW_CONFIDENCE_FALLBACK => "low confidence fallback",
            Self::R204_EMPTY_CLAIM_SET => "empty claim set",
            Self::R205_TONE_BLEND_REQUESTED => "blend tonal resonance downstream",
            Self::R206_GOVERNOR_OVERRIDE => "confidence governor override",
            Self::R301_LOOP_STARTED => "looping started",
            Self::R302_LOOP_CONTINUED => "looping continued",
            Self::R303_LOOP_TRANSITIONED => "looping transitioned",
            Self::R304_LOOP_ABORTED => "looping aborted",
            Self::R305_LOOP_SUPPRESSED_WITNESS => "looping suppressed, witness only",
            Self::R306_LOOP_LIGHT_TOUCH => "looping limited to light touch",
            Self::R307_LOOP_FAILURE => "looping failure, witness fallback",
            Self::R308_LOOP_DISPLACED => "looping displaced by another leader",
            Self::R401_ORCHESTRATION_RECOVERED => "orchestration failure recovered",
            Self::R402_SAFETY_GATE_FAILURE => "safety gate failure, intervention",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
