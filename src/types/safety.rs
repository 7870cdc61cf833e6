//! Safety gate and interrupt gate result types

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{LoopPhase, ReasonCode, SubsystemId};

/// Zero-tolerance catastrophic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    MentalHealth,
    Safety,
    ExplicitBoundary,
    TimeCritical,
    HelpRequest,
    Medical,
}

impl SafetyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MentalHealth => "mental_health",
            Self::Safety => "safety",
            Self::ExplicitBoundary => "explicit_boundary",
            Self::TimeCritical => "time_critical",
            Self::HelpRequest => "help_request",
            Self::Medical => "medical",
        }
    }
}

impl std::fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a catastrophic-gate assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<SafetyCategory>,
    /// 1.0 for keyword hits, 0.8 for contextual hits, 0.0 when not detected
    pub confidence: f64,
    /// Crisis script with resources embedded, empty when not detected
    pub response: String,
    /// Resource strings embedded in the response, verbatim
    pub resources: Vec<String>,
    /// Which pass produced the hit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl SafetyAssessment {
    /// Nothing detected
    pub fn clear() -> Self {
        Self {
            detected: false,
            category: None,
            confidence: 0.0,
            response: String::new(),
            resources: Vec::new(),
            reason: None,
        }
    }
}

/// Rate-based alerting status over the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    Safe,
    Alert,
    Critical,
}

impl std::fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SafetyStatus::Safe => "SAFE",
            SafetyStatus::Alert => "ALERT",
            SafetyStatus::Critical => "CRITICAL",
        };
        write!(f, "{}", name)
    }
}

/// One entry in the detection ring buffer; never holds the raw utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub at: DateTime<Utc>,
    pub category: SafetyCategory,
    pub confidence: f64,
    /// Truncated SHA-256 of the normalized utterance
    pub fingerprint: String,
}

/// Narrow pre-empt categories of the interrupt gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptCategory {
    Emergency,
    Boundary,
    Time,
    Help,
}

impl InterruptCategory {
    /// Subsystem that leads when this category interrupts
    pub fn leader(&self) -> SubsystemId {
        match self {
            InterruptCategory::Boundary => SubsystemId::ExplicitBoundary,
            InterruptCategory::Emergency | InterruptCategory::Time | InterruptCategory::Help => {
                SubsystemId::Urgency
            }
        }
    }

    /// Loop phase an active loop moves to
    pub fn next_state(&self) -> LoopPhase {
        match self {
            InterruptCategory::Help => LoopPhase::Transitioning,
            InterruptCategory::Emergency | InterruptCategory::Boundary | InterruptCategory::Time => {
                LoopPhase::Aborted
            }
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            InterruptCategory::Emergency => ReasonCode::R114_INTERRUPT_EMERGENCY,
            InterruptCategory::Boundary => ReasonCode::R111_INTERRUPT_BOUNDARY,
            InterruptCategory::Time => ReasonCode::R112_INTERRUPT_TIME,
            InterruptCategory::Help => ReasonCode::R113_INTERRUPT_HELP,
        }
    }
}

/// Result of the interrupt gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptOutcome {
    pub interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<InterruptCategory>,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state: Option<LoopPhase>,
}

impl InterruptOutcome {
    pub fn none() -> Self {
        Self {
            interrupted: false,
            category: None,
            response: String::new(),
            next_state: None,
        }
    }
}

/// How much looping the protocol confidence allows this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPermission {
    /// Confidence < 0.3: witness only
    WitnessOnly,
    /// 0.3..=0.7: one light iteration
    LightTouch,
    /// > 0.7: full loop
    Full,
}

/// Weighted protocol confidence with its inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfidence {
    pub trigger_strength: f64,
    pub semantic_clarity: f64,
    pub emotional_stability: f64,
    pub cultural_certainty: f64,
    /// Attempts already made in this session
    pub prior_attempts: u32,
    /// Decayed weighted score
    pub score: f64,
    pub permission: LoopPermission,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_leads_as_explicit_boundary() {
        assert_eq!(InterruptCategory::Boundary.leader(), SubsystemId::ExplicitBoundary);
        assert_eq!(InterruptCategory::Boundary.next_state(), LoopPhase::Aborted);
        assert_eq!(InterruptCategory::Help.next_state(), LoopPhase::Transitioning);
    }

    #[test]
    fn test_status_ordering() {
        assert!(SafetyStatus::Safe < SafetyStatus::Alert);
        assert!(SafetyStatus::Alert < SafetyStatus::Critical);
    }
}
