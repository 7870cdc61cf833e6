//! Decision: the resolved arbitration outcome for a turn

use serde::{Deserialize, Serialize};
use crate::types::{Claim, ReasonCode, SubsystemId, Tone};

/// Default text used when nothing confident can lead
pub const DEFAULT_FALLBACK_RESPONSE: &str =
    "I'm here and listening. Tell me more about what's on your mind.";

/// Generic safe response after an unrecoverable failure
pub const SAFE_RESPONSE: &str =
    "I want to make sure you're okay. I'm here with you. If you are in danger or thinking \
     about hurting yourself, please contact your local emergency services right away.";

/// Structured trace of how a decision was reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLog {
    pub reason: String,
    pub claims: Vec<Claim>,
    pub decision_path: Vec<String>,
    /// Tone to blend into the leader's response downstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_tone: Option<Tone>,
}

impl DecisionLog {
    /// Append a reason code to the path
    pub fn push(&mut self, code: ReasonCode) {
        self.decision_path.push(code.to_string());
    }

    /// Append a reason code with extra detail
    pub fn push_detail(&mut self, code: ReasonCode, detail: impl std::fmt::Display) {
        self.decision_path.push(format!("{} ({})", code, detail));
    }

    /// Has this code been recorded?
    pub fn contains(&self, code: ReasonCode) -> bool {
        self.decision_path.iter().any(|p| p.starts_with(code.code()))
    }
}

/// Arbitration result surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub leader: SubsystemId,
    pub response: String,
    /// 0.0-1.0
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub log: DecisionLog,
}

impl Decision {
    /// Decision led by a single claim
    pub fn from_claim(claim: &Claim, reason: impl Into<String>) -> Self {
        Self {
            leader: claim.subsystem_id,
            response: claim.response.clone(),
            confidence: claim.confidence,
            fallback: None,
            log: DecisionLog {
                reason: reason.into(),
                claims: vec![claim.clone()],
                decision_path: Vec::new(),
                blend_tone: None,
            },
        }
    }

    /// Intervention-style recovery decision
    pub fn safe_recovery(code: ReasonCode, detail: impl std::fmt::Display) -> Self {
        let mut log = DecisionLog {
            reason: code.description().to_string(),
            ..DecisionLog::default()
        };
        log.push_detail(code, detail);
        Self {
            leader: SubsystemId::Safety,
            response: SAFE_RESPONSE.to_string(),
            confidence: 1.0,
            fallback: None,
            log,
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let color = match self.leader {
            SubsystemId::CatastrophicGuard | SubsystemId::Safety => "\x1b[31m",
            SubsystemId::ExplicitBoundary | SubsystemId::Urgency => "\x1b[33m",
            SubsystemId::Clarification => "\x1b[36m",
            SubsystemId::DefaultFallback => "\x1b[90m",
            _ => "\x1b[32m",
        };
        format!(
            "{}[{} {:.2}]\x1b[0m {}",
            color, self.leader, self.confidence, self.response
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "leader={} | confidence={:.3} | fallback={} | response={}",
            self.leader,
            self.confidence,
            self.fallback.is_some(),
            self.response
        )
    }
}
