//! Integration tests for arbitration
//!
//! Safety override, resolver totality, governor and depth properties

use arbiter::core::{ConfidenceGovernor, Orchestrator, PriorityResolver};
use arbiter::config::ResolverConfig;
use arbiter::types::{
    Claim, ConvergenceMetrics, Depth, ReasonCode, SafetyStatus, SubsystemId, Tone, TurnInput,
    DEFAULT_FALLBACK_RESPONSE,
};
use pretty_assertions::assert_eq;

fn resolver() -> PriorityResolver {
    PriorityResolver::new(&ResolverConfig::default())
}

fn governor() -> ConfidenceGovernor {
    ConfidenceGovernor::new(&ResolverConfig::default())
}

fn claim(id: SubsystemId, confidence: f64, response: &str) -> Claim {
    Claim::new(id, confidence, response, "test")
}

// =============================================================================
// CATASTROPHIC
// =============================================================================

#[tokio::test]
async fn test_end_it_all_is_catastrophic() {
    let orchestrator = Orchestrator::default();
    let outcome = orchestrator
        .process_turn(TurnInput::new("u1", "I want to end it all"))
        .await
        .unwrap();

    assert_eq!(outcome.decision.leader, SubsystemId::CatastrophicGuard);
    assert_eq!(outcome.decision.confidence, 1.0);
    assert!(outcome.decision.response.contains("988"));
    // No other detector contributed
    assert_eq!(outcome.decision.log.claims.len(), 1);
    assert!(outcome.decision.log.contains(ReasonCode::R101_CATASTROPHIC_OVERRIDE));
}

#[tokio::test]
async fn test_catastrophic_resources_follow_locale() {
    let orchestrator = Orchestrator::default();
    let mut input = TurnInput::new("u1", "I want to end it all");
    input.user_preferences.locale = "en-GB".to_string();
    let outcome = orchestrator.process_turn(input).await.unwrap();
    assert!(outcome.decision.response.contains("Samaritans"));
}

#[tokio::test]
async fn test_repeated_detections_raise_alert() {
    let orchestrator = Orchestrator::default();
    for _ in 0..3 {
        orchestrator
            .process_turn(TurnInput::new("u1", "I want to end it all"))
            .await
            .unwrap();
    }
    assert_eq!(orchestrator.safety_status(), SafetyStatus::Alert);
    assert_eq!(orchestrator.recent_detections(), 3);
}

#[test]
fn test_catastrophic_claim_always_leads() {
    let claim_sets = vec![
        vec![claim(SubsystemId::CatastrophicGuard, 0.2, "crisis")],
        vec![
            claim(SubsystemId::ExplicitBoundary, 1.0, "boundary"),
            claim(SubsystemId::CatastrophicGuard, 0.8, "crisis"),
        ],
        vec![
            claim(SubsystemId::Narrative, 0.9, "story"),
            claim(SubsystemId::Urgency, 0.9, "urgent"),
            claim(SubsystemId::CatastrophicGuard, 0.01, "crisis"),
            claim(SubsystemId::Clarification, 0.95, "clarify"),
        ],
    ];

    for claims in claim_sets {
        let decision = resolver().resolve(&claims);
        assert_eq!(decision.leader, SubsystemId::CatastrophicGuard);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.response, "crisis");
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

#[test]
fn test_resolver_is_total() {
    let claim_sets = vec![
        vec![],
        vec![claim(SubsystemId::Narrative, 0.0, "story")],
        vec![claim(SubsystemId::TonalResonance, 0.6, "tone"), claim(SubsystemId::Narrative, 0.6, "story")],
        vec![claim(SubsystemId::DefaultFallback, 0.1, "fallback")],
    ];

    for claims in claim_sets {
        let decision = resolver().resolve(&claims);
        assert!(!decision.response.is_empty());
        assert!(!decision.log.decision_path.is_empty());
    }
}

#[test]
fn test_low_confidence_fallback() {
    let claims = vec![
        claim(SubsystemId::Urgency, 0.1, "urgent"),
        claim(SubsystemId::Narrative, 0.25, "story"),
        claim(SubsystemId::ContemplativePause, 0.2, "pause"),
    ];
    let decision = resolver().resolve(&claims);

    assert_eq!(decision.leader, SubsystemId::Narrative);
    assert_eq!(decision.confidence, 0.25);
    assert_eq!(decision.fallback.as_deref(), Some(DEFAULT_FALLBACK_RESPONSE));
    assert!(decision.log.contains(ReasonCode::R203_LOW_CONFIDENCE_FALLBACK));
}

#[test]
fn test_priority_beats_confidence() {
    let claims = vec![
        claim(SubsystemId::Narrative, 0.9, "story"),
        claim(SubsystemId::Clarification, 0.4, "clarify"),
    ];
    assert_eq!(resolver().resolve(&claims).leader, SubsystemId::Clarification);
}

#[test]
fn test_tone_blend_annotated() {
    let claims = vec![
        claim(SubsystemId::Narrative, 0.6, "story"),
        claim(SubsystemId::TonalResonance, 0.5, "tone").with_tone(Some(Tone::Water)),
        claim(SubsystemId::Urgency, 0.7, "urgent"),
    ];
    let decision = resolver().resolve(&claims);
    assert_eq!(decision.leader, SubsystemId::Urgency);
    assert_eq!(decision.log.blend_tone, Some(Tone::Water));
    assert!(decision.log.contains(ReasonCode::R205_TONE_BLEND_REQUESTED));
}

// =============================================================================
// GOVERNOR
// =============================================================================

#[test]
fn test_governor_idempotent() {
    let claim_sets = vec![
        vec![claim(SubsystemId::Narrative, 0.35, "story")],
        vec![claim(SubsystemId::Urgency, 0.1, "urgent")],
        vec![claim(SubsystemId::Clarification, 0.8, "clarify")],
        vec![],
    ];

    for claims in claim_sets {
        let once = governor().govern(resolver().resolve(&claims));
        let twice = governor().govern(once.clone());
        assert_eq!(once, twice);
    }
}

#[test]
fn test_governor_forces_fallback_below_threshold() {
    let decision = governor().govern(resolver().resolve(&[claim(SubsystemId::Narrative, 0.35, "story")]));
    assert_eq!(decision.leader, SubsystemId::DefaultFallback);
    assert_eq!(decision.response, DEFAULT_FALLBACK_RESPONSE);
    assert!(decision.log.contains(ReasonCode::R206_GOVERNOR_OVERRIDE));
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[test]
fn test_overall_is_weighted_sum() {
    let vectors = [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0, 1.0, 1.0, 1.0, 1.0],
        [0.9, 0.1, 0.5, 0.3, 0.7],
        [0.2, 0.8, 0.4, 0.6, 0.0],
    ];
    for [s, e, a, t, c] in vectors {
        let metrics = ConvergenceMetrics::new(s, e, a, t, c);
        let expected = 0.30 * s + 0.25 * e + 0.15 * a + 0.15 * t + 0.15 * c;
        assert!((metrics.overall - expected).abs() < 1e-9);
    }
}

#[test]
fn test_depth_mapping() {
    let expected = [
        (0, Depth::Surface),
        (1, Depth::Surface),
        (2, Depth::Moderate),
        (5, Depth::Moderate),
        (6, Depth::Deep),
    ];
    for (count, depth) in expected {
        assert_eq!(Depth::from_exchange_count(count), depth, "exchange count {}", count);
    }
}

#[tokio::test]
async fn test_depth_follows_exchanges() {
    let orchestrator = Orchestrator::default();
    let story = "Yesterday I walked to the old harbour and then we talked about the boats.";
    let mut depths = Vec::new();
    for _ in 0..6 {
        let outcome = orchestrator.process_turn(TurnInput::new("u1", story)).await.unwrap();
        depths.push(outcome.depth);
    }
    assert_eq!(
        depths,
        vec![Depth::Surface, Depth::Moderate, Depth::Moderate, Depth::Moderate, Depth::Moderate, Depth::Deep]
    );
}
