//! Convergence metrics: how well the inferred meaning matches the user's

use serde::{Deserialize, Serialize};
use crate::{
    CV_WEIGHT_SEMANTIC, CV_WEIGHT_EMOTIONAL, CV_WEIGHT_ARCHETYPAL,
    CV_WEIGHT_TONAL, CV_WEIGHT_CONFIRMATION,
};

/// Five convergence sub-scores plus their fixed-weight overall
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceMetrics {
    /// Feedback agrees with the essential-meaning guess (weight: 0.30)
    pub semantic_alignment: f64,
    /// Emotional register is being met (weight: 0.25)
    pub emotional_resonance: f64,
    /// Archetypal pattern is clear (weight: 0.15)
    pub archetypal_clarity: f64,
    /// Tone matches the session tone (weight: 0.15)
    pub tonal_coherence: f64,
    /// Explicit user confirmation (weight: 0.15)
    pub user_confirmation: f64,
    /// Weighted sum of the above
    pub overall: f64,
}

impl ConvergenceMetrics {
    /// Build metrics; sub-scores are clamped to [0,1] and overall is derived
    pub fn new(
        semantic_alignment: f64,
        emotional_resonance: f64,
        archetypal_clarity: f64,
        tonal_coherence: f64,
        user_confirmation: f64,
    ) -> Self {
        let mut metrics = Self {
            semantic_alignment: semantic_alignment.clamp(0.0, 1.0),
            emotional_resonance: emotional_resonance.clamp(0.0, 1.0),
            archetypal_clarity: archetypal_clarity.clamp(0.0, 1.0),
            tonal_coherence: tonal_coherence.clamp(0.0, 1.0),
            user_confirmation: user_confirmation.clamp(0.0, 1.0),
            overall: 0.0,
        };
        metrics.overall = metrics.weighted_sum();
        metrics
    }

    /// Uniform metrics (every sub-score equal)
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value)
    }

    /// Fixed-weight sum of the five sub-scores
    pub fn weighted_sum(&self) -> f64 {
        self.semantic_alignment * CV_WEIGHT_SEMANTIC
            + self.emotional_resonance * CV_WEIGHT_EMOTIONAL
            + self.archetypal_clarity * CV_WEIGHT_ARCHETYPAL
            + self.tonal_coherence * CV_WEIGHT_TONAL
            + self.user_confirmation * CV_WEIGHT_CONFIRMATION
    }
}

/// Advisory shape of the recent convergence trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergencePattern {
    /// Fewer than three points
    Insufficient,
    Improving,
    Plateaued,
    Declining,
    Oscillating,
}

/// Tracker's advice for the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Loop,
    Deepen,
    Transition,
    Complete,
}
