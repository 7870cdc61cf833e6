//! Turn outcome returned to callers

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{Decision, Depth, LoopPhase, SafetyStatus};

/// Opaque handle to synthesized audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioHandle {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Output for each processed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub session_id: String,
    pub exchange_count: u64,
    pub depth: Depth,
    /// Phase of the clarification loop after this turn, if one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_phase: Option<LoopPhase>,
    /// Protocol confidence computed by the interrupt gate, if reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_confidence: Option<f64>,
    pub safety_status: SafetyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioHandle>,
}

impl TurnOutcome {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let loop_part = self.loop_phase
            .map(|p| format!(" | loop={}", p))
            .unwrap_or_default();
        format!(
            "{}\n\x1b[90m  exchange={} | depth={}{} | safety={}\x1b[0m",
            self.decision.to_terminal_string(),
            self.exchange_count,
            self.depth,
            loop_part,
            self.safety_status,
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let loop_phase = self.loop_phase
            .map(|p| p.to_string())
            .unwrap_or_else(|| "NONE".to_string());
        format!(
            "{} | exchange={} | depth={} | loop={} | safety={}",
            self.decision.to_parseable_string(),
            self.exchange_count,
            self.depth,
            loop_phase,
            self.safety_status,
        )
    }
}
