//! Looping (iterative clarification) state definitions

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::error::LoopingError;
use crate::types::{ConvergenceMetrics, Tone};

/// Phases of the clarification protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    Idle,
    /// Capturing the surface utterance
    Listening,
    /// Producing a tone-lensed paraphrase
    Paraphrasing,
    /// Checking question issued, awaiting reply
    Checking,
    /// Folding a reply into the guess
    Correcting,
    /// Terminal: hand back to normal flow
    Transitioning,
    /// Terminal: boundary, mismatch or failure
    Aborted,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Transitioning | LoopPhase::Aborted)
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopPhase::Idle => "IDLE",
            LoopPhase::Listening => "LISTENING",
            LoopPhase::Paraphrasing => "PARAPHRASING",
            LoopPhase::Checking => "CHECKING",
            LoopPhase::Correcting => "CORRECTING",
            LoopPhase::Transitioning => "TRANSITIONING",
            LoopPhase::Aborted => "ABORTED",
        };
        write!(f, "{}", name)
    }
}

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Convergence reached the profile's optimal threshold
    Converged,
    /// Iteration budget exhausted
    MaxIterations,
    /// Convergence stopped moving
    Plateau,
    /// Repeated silence, user needs space
    NeedsSpace,
    /// Explicit stop or boundary
    Boundary,
    /// Repeated rejection, alternative mode offered
    ParadigmMismatch,
    /// Internal failure, degraded to witness
    Failure,
    /// Another subsystem took the lead mid-loop
    Displaced,
    /// User asked to move on to something practical
    Redirected,
    /// A safety or interrupt gate took the turn
    Preempted,
}

impl LoopOutcome {
    /// Terminal phase for this outcome
    pub fn terminal_phase(&self) -> LoopPhase {
        match self {
            LoopOutcome::Converged
            | LoopOutcome::MaxIterations
            | LoopOutcome::Plateau
            | LoopOutcome::NeedsSpace
            | LoopOutcome::Redirected => LoopPhase::Transitioning,
            LoopOutcome::Boundary
            | LoopOutcome::ParadigmMismatch
            | LoopOutcome::Failure
            | LoopOutcome::Displaced
            | LoopOutcome::Preempted => LoopPhase::Aborted,
        }
    }
}

/// Classified reply to a checking question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Agree,
    Correct,
    Silent,
}

/// Named threshold bundle controlling looping aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityProfile {
    Light,
    #[default]
    Full,
    Sacred,
}

impl IntensityProfile {
    /// Threshold bundle for this profile
    pub fn thresholds(&self) -> ProfileThresholds {
        match self {
            IntensityProfile::Light => ProfileThresholds {
                max_loops: 1,
                minimum: 0.4,
                sufficient: 0.5,
                optimal: 0.6,
                maximum: 0.9,
                emotional_trigger: 0.8,
                ambiguity_trigger: 0.7,
            },
            IntensityProfile::Full => ProfileThresholds {
                max_loops: 3,
                minimum: 0.5,
                sufficient: 0.65,
                optimal: 0.75,
                maximum: 0.95,
                emotional_trigger: 0.7,
                ambiguity_trigger: 0.6,
            },
            IntensityProfile::Sacred => ProfileThresholds {
                max_loops: 7,
                minimum: 0.6,
                sufficient: 0.8,
                optimal: 0.9,
                maximum: 0.98,
                emotional_trigger: 0.5,
                ambiguity_trigger: 0.4,
            },
        }
    }

    /// Parse a loose profile name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => Some(IntensityProfile::Light),
            "full" => Some(IntensityProfile::Full),
            "sacred" => Some(IntensityProfile::Sacred),
            _ => None,
        }
    }
}

/// Convergence and activation thresholds of a profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileThresholds {
    pub max_loops: u32,
    pub minimum: f64,
    pub sufficient: f64,
    pub optimal: f64,
    pub maximum: f64,
    /// Emotional intensity above which looping activates
    pub emotional_trigger: f64,
    /// Ambiguity above which looping activates
    pub ambiguity_trigger: f64,
}

impl ProfileThresholds {
    /// Enforce minimum < sufficient < optimal < maximum and a bounded loop
    pub fn validate(&self) -> Result<(), LoopingError> {
        let ordered = self.minimum < self.sufficient
            && self.sufficient < self.optimal
            && self.optimal < self.maximum;
        if !ordered {
            return Err(LoopingError::InvalidThresholds(format!(
                "expected minimum < sufficient < optimal < maximum, got {} / {} / {} / {}",
                self.minimum, self.sufficient, self.optimal, self.maximum
            )));
        }
        if self.max_loops == 0 {
            return Err(LoopingError::InvalidThresholds("max_loops must be at least 1".into()));
        }
        Ok(())
    }
}

/// One fold of a reply into the essential-meaning guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub iteration: u32,
    pub reply: ReplyKind,
    pub previous_guess: String,
    pub revised_guess: String,
    pub convergence: f64,
}

/// Multi-turn clarification state, persisted on the session between turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopingState {
    pub surface_capture: String,
    pub essential_meaning_guess: String,
    /// Paraphrase-check iterations presented so far (never exceeds max_loops)
    pub loop_count: u32,
    pub max_loops: u32,
    /// Latest overall convergence
    pub convergence: f64,
    pub adjustment_history: Vec<Adjustment>,
    pub phase: LoopPhase,
    pub profile: IntensityProfile,
    /// Tone lens used for phrasing
    pub tone: Tone,
    pub convergence_history: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<ConvergenceMetrics>,
    pub rejection_count: u32,
    pub silence_count: u32,
    /// When the last checking question was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_since: Option<DateTime<Utc>>,
}

impl LoopingState {
    /// Fresh state for a surface utterance
    pub fn new(surface: impl Into<String>, profile: IntensityProfile, tone: Tone) -> Self {
        Self {
            surface_capture: surface.into(),
            essential_meaning_guess: String::new(),
            loop_count: 0,
            max_loops: profile.thresholds().max_loops,
            convergence: 0.0,
            adjustment_history: Vec::new(),
            phase: LoopPhase::Idle,
            profile,
            tone,
            convergence_history: Vec::new(),
            last_metrics: None,
            rejection_count: 0,
            silence_count: 0,
            awaiting_since: None,
        }
    }

    /// Is the loop waiting on a reply?
    pub fn is_awaiting_reply(&self) -> bool {
        self.phase == LoopPhase::Checking
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_profiles_valid() {
        for profile in [IntensityProfile::Light, IntensityProfile::Full, IntensityProfile::Sacred] {
            assert!(profile.thresholds().validate().is_ok(), "{:?}", profile);
        }
    }

    #[test]
    fn test_profile_budgets() {
        assert_eq!(IntensityProfile::Light.thresholds().max_loops, 1);
        assert_eq!(IntensityProfile::Full.thresholds().max_loops, 3);
        assert!(IntensityProfile::Sacred.thresholds().max_loops > 3);
        assert_eq!(IntensityProfile::Light.thresholds().optimal, 0.6);
        assert_eq!(IntensityProfile::Full.thresholds().optimal, 0.75);
        assert_eq!(IntensityProfile::Sacred.thresholds().optimal, 0.9);
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let mut t = IntensityProfile::Full.thresholds();
        t.sufficient = t.optimal;
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_outcome_terminal_phases() {
        assert_eq!(LoopOutcome::Converged.terminal_phase(), LoopPhase::Transitioning);
        assert_eq!(LoopOutcome::NeedsSpace.terminal_phase(), LoopPhase::Transitioning);
        assert_eq!(LoopOutcome::Boundary.terminal_phase(), LoopPhase::Aborted);
        assert_eq!(LoopOutcome::ParadigmMismatch.terminal_phase(), LoopPhase::Aborted);
    }

    #[test]
    fn test_new_state_budget_from_profile() {
        let state = LoopingState::new("hello", IntensityProfile::Sacred, Tone::Water);
        assert_eq!(state.max_loops, 7);
        assert_eq!(state.phase, LoopPhase::Idle);
        assert!(!state.is_awaiting_reply());
    }
}
