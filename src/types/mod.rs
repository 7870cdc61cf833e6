//! Core types for Arbiter

mod tone;
mod signals;
mod claim;
mod reason;
mod decision;
mod convergence;
mod looping;
mod safety;
mod session;
mod context;
mod output;

pub use tone::{Tone, Depth, SpiralPhase};
pub use signals::{ToneSignals, ToneReading, ClaritySignals};
pub use claim::{Claim, ClaimMetadata, SubsystemId, UrgencyLevel};
pub use reason::ReasonCode;
pub use decision::{Decision, DecisionLog, DEFAULT_FALLBACK_RESPONSE, SAFE_RESPONSE};
pub use convergence::{ConvergenceMetrics, ConvergencePattern, RecommendedAction};
pub use looping::{
    Adjustment, IntensityProfile, LoopOutcome, LoopPhase, LoopingState, ProfileThresholds, ReplyKind,
};
pub use safety::{
    DetectionRecord, InterruptCategory, InterruptOutcome, LoopPermission, ProtocolConfidence,
    SafetyAssessment, SafetyCategory, SafetyStatus,
};
pub use session::{ConversationHistory, HistoryEntry, Role, Session};
pub use context::{TurnContext, TurnInput, UserPreferences};
pub use output::{AudioHandle, TurnOutcome};
