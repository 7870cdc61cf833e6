//! Error taxonomy for the arbitration engine.
//!
//! Only `ArbiterError::InvalidContext` and `ArbiterError::Config` ever reach a
//! caller; everything else is recovered inside the turn pipeline and logged.

use thiserror::Error;
use crate::types::SubsystemId;

/// Failure of a single detector; the claim is omitted
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector {detector} failed: {message}")]
    Failed { detector: SubsystemId, message: String },

    #[error("detector {detector} panicked")]
    Panicked { detector: SubsystemId },

    #[error("detector {detector} exceeded {timeout_ms}ms")]
    TimedOut { detector: SubsystemId, timeout_ms: u64 },
}

impl DetectorError {
    pub fn detector(&self) -> SubsystemId {
        match self {
            Self::Failed { detector, .. }
            | Self::Panicked { detector }
            | Self::TimedOut { detector, .. } => *detector,
        }
    }
}

/// Failure inside the clarification loop; degrades to a witness response
#[derive(Debug, Error)]
pub enum LoopingError {
    #[error("invalid profile thresholds: {0}")]
    InvalidThresholds(String),

    #[error("cannot {action} while loop is {phase}")]
    InvalidPhase { action: &'static str, phase: String },

    #[error("loop budget exhausted: {loop_count}/{max_loops}")]
    BudgetExceeded { loop_count: u32, max_loops: u32 },
}

/// Failure of an external collaborator; never fails the turn
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("{collaborator} failed: {message}")]
    Failed { collaborator: &'static str, message: String },
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("invalid threshold {name}: {value}. Must be within [0, 1]")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("governor threshold ({governor}) must not be below confident-claim threshold ({confident})")]
    GovernorBelowConfident { governor: f64, confident: f64 },

    #[error("invalid safety thresholds: alert ({alert}) must be below critical ({critical})")]
    SafetyThresholds { alert: usize, critical: usize },

    #[error("invalid {name}: must be greater than zero")]
    Zero { name: &'static str },

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Missing required identifiers; returned to the caller
    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Looping(#[from] LoopingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Anything uncaught in the turn pipeline
    #[error("orchestration failure: {0}")]
    Orchestration(String),
}

pub type ArbiterResult<T> = Result<T, ArbiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_error_reports_detector() {
        let err = DetectorError::TimedOut { detector: SubsystemId::Narrative, timeout_ms: 250 };
        assert_eq!(err.detector(), SubsystemId::Narrative);
        assert_eq!(err.to_string(), "detector narrative exceeded 250ms");
    }

    #[test]
    fn test_looping_error_converts() {
        let err: ArbiterError = LoopingError::InvalidThresholds("x".into()).into();
        assert!(matches!(err, ArbiterError::Looping(_)));
    }
}
