//! Claim collector: fan-out / fan-in over the registered detectors

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::future::join_all;
use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::config::CollectorConfig;
use crate::core::detector::SignalDetector;
use crate::core::detectors::default_detectors;
use crate::core::safety::CatastrophicGate;
use crate::error::DetectorError;
use crate::types::{Claim, SubsystemId, TurnContext, DEFAULT_FALLBACK_RESPONSE};
use crate::DEFAULT_FALLBACK_CONFIDENCE;

/// Result of one collection pass
#[derive(Debug, Clone)]
pub struct Collection {
    /// Never empty
    pub claims: Vec<Claim>,
    /// A catastrophic detector short-circuited the pass
    pub short_circuited: bool,
    pub elapsed: Duration,
    /// Elapsed exceeded the soft budget
    pub over_budget: bool,
    /// Detectors whose claims were dropped
    pub failures: Vec<SubsystemId>,
}

pub struct ClaimCollector {
    detectors: Vec<Arc<dyn SignalDetector>>,
    config: CollectorConfig,
}

impl ClaimCollector {
    pub fn new(detectors: Vec<Arc<dyn SignalDetector>>, config: CollectorConfig) -> Self {
        Self { detectors, config }
    }

    /// Collector over the built-in detector set
    pub fn with_default_detectors(gate: Arc<CatastrophicGate>, config: CollectorConfig) -> Self {
        Self::new(default_detectors(gate), config)
    }

    /// Register another detector
    pub fn register(&mut self, detector: Arc<dyn SignalDetector>) {
        self.detectors.push(detector);
    }

    pub fn detector_ids(&self) -> Vec<SubsystemId> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Evaluate every detector and return the claims
    ///
    /// Catastrophic detectors run first, one at a time; a catastrophic claim
    /// returns immediately. The rest run concurrently and all settle before
    /// this returns.
    pub async fn collect(&self, utterance: &str, ctx: &TurnContext) -> Collection {
        let started = Instant::now();
        let timeout = self.config.detector_timeout();
        let mut failures = Vec::new();

        for detector in self.detectors.iter().filter(|d| d.is_catastrophic()) {
            match run_isolated(detector.as_ref(), utterance, ctx, timeout).await {
                Ok(Some(claim)) if claim.is_catastrophic() => {
                    let elapsed = started.elapsed();
                    debug!(session_id = %ctx.session_id, detector = %detector.id(), "catastrophic short-circuit");
                    return Collection {
                        claims: vec![claim],
                        short_circuited: true,
                        elapsed,
                        over_budget: elapsed > self.config.budget(),
                        failures,
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    log_failure(&err, ctx);
                    failures.push(err.detector());
                }
            }
        }

        let pending = self
            .detectors
            .iter()
            .filter(|d| !d.is_catastrophic())
            .map(|d| run_isolated(d.as_ref(), utterance, ctx, timeout));

        let mut claims = Vec::new();
        for result in join_all(pending).await {
            match result {
                Ok(Some(claim)) => claims.push(claim),
                Ok(None) => {}
                Err(err) => {
                    log_failure(&err, ctx);
                    failures.push(err.detector());
                }
            }
        }

        if claims.is_empty() {
            claims.push(Claim::new(
                SubsystemId::DefaultFallback,
                DEFAULT_FALLBACK_CONFIDENCE,
                DEFAULT_FALLBACK_RESPONSE,
                "no detector claimed the turn",
            ));
        }

        let elapsed = started.elapsed();
        let over_budget = elapsed > self.config.budget();
        if over_budget {
            warn!(
                category = "collection_timeout",
                session_id = %ctx.session_id,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.budget_ms,
                "claim collection exceeded soft budget"
            );
        }

        Collection {
            claims,
            short_circuited: false,
            elapsed,
            over_budget,
            failures,
        }
    }
}

/// Run one detector with a hard timeout, turning panics into errors
async fn run_isolated(
    detector: &dyn SignalDetector,
    utterance: &str,
    ctx: &TurnContext,
    timeout: Duration,
) -> Result<Option<Claim>, DetectorError> {
    let id = detector.id();
    let guarded = AssertUnwindSafe(detector.detect(utterance, ctx)).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(DetectorError::Panicked { detector: id }),
        Err(_) => Err(DetectorError::TimedOut {
            detector: id,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn log_failure(err: &DetectorError, ctx: &TurnContext) {
    warn!(
        category = "detector_failure",
        session_id = %ctx.session_id,
        detector = %err.detector(),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        error = %err,
        "detector failed, claim omitted"
    );
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;

    struct Fixed {
        id: SubsystemId,
        confidence: f64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SignalDetector for Fixed {
        fn id(&self) -> SubsystemId {
            self.id
        }

        async fn detect(&self, _u: &str, _c: &TurnContext) -> Result<Option<Claim>, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Claim::new(self.id, self.confidence, "fixed", "test")))
        }
    }

    struct Panics;

    #[async_trait]
    impl SignalDetector for Panics {
        fn id(&self) -> SubsystemId {
            SubsystemId::Narrative
        }

        async fn detect(&self, _u: &str, _c: &TurnContext) -> Result<Option<Claim>, DetectorError> {
            panic!("detector bug");
        }
    }

    struct Fails;

    #[async_trait]
    impl SignalDetector for Fails {
        fn id(&self) -> SubsystemId {
            SubsystemId::Urgency
        }

        async fn detect(&self, _u: &str, _c: &TurnContext) -> Result<Option<Claim>, DetectorError> {
            Err(DetectorError::Failed { detector: SubsystemId::Urgency, message: "boom".into() })
        }
    }

    struct Slow;

    #[async_trait]
    impl SignalDetector for Slow {
        fn id(&self) -> SubsystemId {
            SubsystemId::ContemplativePause
        }

        async fn detect(&self, _u: &str, _c: &TurnContext) -> Result<Option<Claim>, DetectorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(Claim::new(SubsystemId::ContemplativePause, 0.9, "late", "slow")))
        }
    }

    fn fixed(id: SubsystemId, confidence: f64, calls: &Arc<AtomicUsize>) -> Arc<dyn SignalDetector> {
        Arc::new(Fixed { id, confidence, calls: calls.clone() })
    }

    fn config() -> CollectorConfig {
        CollectorConfig { budget_ms: 100, detector_timeout_ms: 50 }
    }

    #[tokio::test]
    async fn test_empty_detectors_synthesize_fallback() {
        let collector = ClaimCollector::new(Vec::new(), config());
        let collection = collector.collect("hello", &TurnContext::detached("u")).await;
        assert_eq!(collection.claims.len(), 1);
        assert_eq!(collection.claims[0].subsystem_id, SubsystemId::DefaultFallback);
        assert_eq!(collection.claims[0].confidence, DEFAULT_FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_catastrophic_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = ClaimCollector::new(
            vec![
                fixed(SubsystemId::Narrative, 0.9, &calls),
                fixed(SubsystemId::CatastrophicGuard, 1.0, &calls),
                fixed(SubsystemId::Urgency, 0.9, &calls),
            ],
            config(),
        );
        let collection = collector.collect("x", &TurnContext::detached("u")).await;
        assert!(collection.short_circuited);
        assert_eq!(collection.claims.len(), 1);
        assert!(collection.claims[0].is_catastrophic());
        // Only the catastrophic detector ran
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_and_error_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = ClaimCollector::new(
            vec![Arc::new(Panics), Arc::new(Fails), fixed(SubsystemId::TonalResonance, 0.6, &calls)],
            config(),
        );
        let collection = collector.collect("x", &TurnContext::detached("u")).await;
        assert_eq!(collection.claims.len(), 1);
        assert_eq!(collection.claims[0].subsystem_id, SubsystemId::TonalResonance);
        assert_eq!(collection.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_detector_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let collector = ClaimCollector::new(
            vec![Arc::new(Slow), fixed(SubsystemId::Narrative, 0.6, &calls)],
            config(),
        );
        let collection = collector.collect("x", &TurnContext::detached("u")).await;
        assert_eq!(collection.claims.len(), 1);
        assert_eq!(collection.claims[0].subsystem_id, SubsystemId::Narrative);
        assert_eq!(collection.failures, vec![SubsystemId::ContemplativePause]);
    }

    #[tokio::test]
    async fn test_default_detectors_catastrophic_scenario() {
        let collector = ClaimCollector::with_default_detectors(
            Arc::new(CatastrophicGate::default()),
            CollectorConfig::default(),
        );
        let collection = collector.collect("I want to end it all", &TurnContext::detached("u")).await;
        assert!(collection.short_circuited);
        assert_eq!(collection.claims.len(), 1);
        assert_eq!(collection.claims[0].subsystem_id, SubsystemId::CatastrophicGuard);
    }
}
