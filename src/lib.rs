//! Arbiter: turn arbitration and iterative clarification engine
//!
//! utterance → CatastrophicGate → TempleInterruptGate → ClaimCollector
//! → PriorityResolver (+ governor) → LoopingProtocol → SessionManager → Monitor

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod types;

// =============================================================================
// ARBITRATION THRESHOLDS
// =============================================================================

/// Claims below this confidence are not eligible to lead on priority alone
pub const CONFIDENT_CLAIM_THRESHOLD: f64 = 0.3;

/// Decisions below this confidence are forced to the default fallback
pub const GOVERNOR_THRESHOLD: f64 = 0.4;

/// Confidence of the synthesized default-fallback claim
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.5;

/// Soft budget for one collection pass (milliseconds)
pub const COLLECTION_BUDGET_MS: u64 = 100;

/// Hard per-detector timeout (milliseconds); a slower detector's claim is dropped
pub const DETECTOR_TIMEOUT_MS: u64 = 250;

// =============================================================================
// SAFETY
// =============================================================================

/// Confidence of a keyword hit in the catastrophic gate
pub const SAFETY_KEYWORD_CONFIDENCE: f64 = 1.0;

/// Confidence of a contextual-pattern hit in the catastrophic gate
pub const SAFETY_CONTEXTUAL_CONFIDENCE: f64 = 0.8;

// =============================================================================
// PROTOCOL CONFIDENCE WEIGHTS (sum = 1.0)
// =============================================================================

pub const PC_WEIGHT_TRIGGER: f64 = 0.3;
pub const PC_WEIGHT_SEMANTIC: f64 = 0.3;
pub const PC_WEIGHT_EMOTIONAL: f64 = 0.2;
pub const PC_WEIGHT_CULTURAL: f64 = 0.2;

/// Below this, looping must not run this turn
pub const PC_WITNESS_ONLY_BELOW: f64 = 0.3;

/// Above this, a full loop is permitted
pub const PC_FULL_LOOP_ABOVE: f64 = 0.7;

/// Per-attempt decay of protocol confidence
pub const PC_ATTEMPT_DECAY: f64 = 0.8;

// =============================================================================
// CONVERGENCE WEIGHTS (sum = 1.0)
// =============================================================================

pub const CV_WEIGHT_SEMANTIC: f64 = 0.30;
pub const CV_WEIGHT_EMOTIONAL: f64 = 0.25;
pub const CV_WEIGHT_ARCHETYPAL: f64 = 0.15;
pub const CV_WEIGHT_TONAL: f64 = 0.15;
pub const CV_WEIGHT_CONFIRMATION: f64 = 0.15;

/// Minimum spread over the last three iterations to count as movement
pub const CV_FLATTENING_DELTA: f64 = 0.05;

// =============================================================================
// SESSION
// =============================================================================

/// Idle time after which a session is reset on access (seconds)
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Interval of the background eviction sweep (seconds)
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 300;

/// Maximum history entries kept per session
pub const SESSION_MAX_HISTORY: usize = 100;

// =============================================================================
// LOOPING
// =============================================================================

/// Silence after a checking question that counts as a silent reply (milliseconds)
pub const LOOP_SILENCE_TIMEOUT_MS: u64 = 8000;

/// Rejections before the loop bails out with an alternative mode
pub const LOOP_PARADIGM_MISMATCH_THRESHOLD: u32 = 3;

/// Silences before the loop transitions as "needs space"
pub const LOOP_MAX_SILENCES: u32 = 2;

/// Convergence assumed when the loop ends on silence
pub const LOOP_SILENCE_ASSUMED_CONVERGENCE: f64 = 0.5;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "0.1.0";
