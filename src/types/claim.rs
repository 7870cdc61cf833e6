//! Claims: a subsystem's bid to lead the turn

use serde::{Deserialize, Serialize};
use crate::types::{Depth, Tone};

/// Subsystems that may lead a turn
///
/// Ordering follows the priority table, so `Ord` doubles as the final
/// deterministic tie-breaker in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubsystemId {
    /// Zero-tolerance safety gate
    CatastrophicGuard,
    /// Top-level recovery leader after an orchestration failure
    Safety,
    ExplicitBoundary,
    Urgency,
    Clarification,
    ContemplativePause,
    TonalResonance,
    Narrative,
    DefaultFallback,
}

impl SubsystemId {
    /// Priority table (lower = more urgent)
    pub fn default_priority(&self) -> u32 {
        match self {
            Self::CatastrophicGuard => 0,
            Self::Safety => 0,
            Self::ExplicitBoundary => 1,
            Self::Urgency => 2,
            Self::Clarification => 3,
            Self::ContemplativePause => 4,
            Self::TonalResonance => 5,
            Self::Narrative => 6,
            Self::DefaultFallback => 99,
        }
    }

    /// Is this the catastrophic category?
    pub fn is_catastrophic(&self) -> bool {
        matches!(self, Self::CatastrophicGuard)
    }

    /// Wire name (matches serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatastrophicGuard => "catastrophicGuard",
            Self::Safety => "safety",
            Self::ExplicitBoundary => "explicitBoundary",
            Self::Urgency => "urgency",
            Self::Clarification => "clarification",
            Self::ContemplativePause => "contemplativePause",
            Self::TonalResonance => "tonalResonance",
            Self::Narrative => "narrative",
            Self::DefaultFallback => "defaultFallback",
        }
    }
}

impl std::fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Urgency carried by a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Descriptive metadata attached to a claim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    pub urgency: UrgencyLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<Depth>,
}

/// A detector's bid to lead this turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub subsystem_id: SubsystemId,
    /// Explicit priority; None falls back to the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// 0.0-1.0
    pub confidence: f64,
    pub response: String,
    pub reason: String,
    #[serde(default)]
    pub metadata: ClaimMetadata,
}

impl Claim {
    /// Create a claim with table priority
    pub fn new(
        subsystem_id: SubsystemId,
        confidence: f64,
        response: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            subsystem_id,
            priority: None,
            confidence: confidence.clamp(0.0, 1.0),
            response: response.into(),
            reason: reason.into(),
            metadata: ClaimMetadata::default(),
        }
    }

    /// Override the table priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: ClaimMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a tone
    pub fn with_tone(mut self, tone: Option<Tone>) -> Self {
        self.metadata.tone = tone;
        self
    }

    /// Attach an urgency level
    pub fn with_urgency(mut self, urgency: UrgencyLevel) -> Self {
        self.metadata.urgency = urgency;
        self
    }

    /// Effective priority (explicit or table default)
    pub fn effective_priority(&self) -> u32 {
        self.priority.unwrap_or_else(|| self.subsystem_id.default_priority())
    }

    /// Is this a catastrophic claim?
    pub fn is_catastrophic(&self) -> bool {
        self.subsystem_id.is_catastrophic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table_ascending() {
        let ordered = [
            SubsystemId::CatastrophicGuard,
            SubsystemId::ExplicitBoundary,
            SubsystemId::Urgency,
            SubsystemId::Clarification,
            SubsystemId::ContemplativePause,
            SubsystemId::TonalResonance,
            SubsystemId::Narrative,
            SubsystemId::DefaultFallback,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].default_priority() < pair[1].default_priority());
        }
        assert_eq!(SubsystemId::DefaultFallback.default_priority(), 99);
    }

    #[test]
    fn test_confidence_clamped() {
        let claim = Claim::new(SubsystemId::Narrative, 1.7, "r", "x");
        assert_eq!(claim.confidence, 1.0);
        let claim = Claim::new(SubsystemId::Narrative, -0.2, "r", "x");
        assert_eq!(claim.confidence, 0.0);
    }

    #[test]
    fn test_explicit_priority_overrides_table() {
        let claim = Claim::new(SubsystemId::Narrative, 0.5, "r", "x").with_priority(1);
        assert_eq!(claim.effective_priority(), 1);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&SubsystemId::CatastrophicGuard).unwrap();
        assert_eq!(json, "\"catastrophicGuard\"");
        assert_eq!(SubsystemId::ExplicitBoundary.to_string(), "explicitBoundary");
    }
}
