//! Priority resolver and confidence governor
//!
//! Resolution is deterministic and total:
//! 1. A catastrophic claim always leads, at confidence 1.0
//! 2. Otherwise sort by priority asc, confidence desc, subsystem, response
//! 3. The first confident claim leads; with none, the most confident one
//!    leads and a fallback is attached

use std::cmp::Ordering;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::types::{Claim, Decision, DecisionLog, ReasonCode, SubsystemId, DEFAULT_FALLBACK_RESPONSE};
use crate::DEFAULT_FALLBACK_CONFIDENCE;

#[derive(Debug, Clone)]
pub struct PriorityResolver {
    confident_threshold: f64,
}

impl Default for PriorityResolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl PriorityResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self { confident_threshold: config.confident_threshold }
    }

    /// Resolve a claim set into a decision
    pub fn resolve(&self, claims: &[Claim]) -> Decision {
        if claims.is_empty() {
            let fallback = Claim::new(
                SubsystemId::DefaultFallback,
                DEFAULT_FALLBACK_CONFIDENCE,
                DEFAULT_FALLBACK_RESPONSE,
                "empty claim set",
            );
            let mut decision = Decision::from_claim(&fallback, ReasonCode::R204_EMPTY_CLAIM_SET.description());
            decision.log.claims.clear();
            decision.log.push(ReasonCode::R204_EMPTY_CLAIM_SET);
            return decision;
        }

        if let Some(catastrophic) = claims.iter().find(|c| c.is_catastrophic()) {
            let mut decision = Decision::from_claim(catastrophic, ReasonCode::R101_CATASTROPHIC_OVERRIDE.description());
            decision.confidence = 1.0;
            decision.log.claims = claims.to_vec();
            decision.log.push(ReasonCode::R101_CATASTROPHIC_OVERRIDE);
            return decision;
        }

        let mut sorted = claims.to_vec();
        sorted.sort_by(compare_claims);

        let mut log = DecisionLog {
            claims: sorted.clone(),
            ..DecisionLog::default()
        };
        log.push(ReasonCode::R201_PRIORITY_SORTED);

        let confident = sorted.iter().find(|c| c.confidence >= self.confident_threshold);

        let mut decision = match confident {
            Some(leader) => {
                log.push_detail(ReasonCode::R202_CONFIDENT_LEADER, leader.subsystem_id);
                log.reason = ReasonCode::R202_CONFIDENT_LEADER.description().to_string();
                Decision {
                    leader: leader.subsystem_id,
                    response: leader.response.clone(),
                    confidence: leader.confidence,
                    fallback: None,
                    log,
                }
            }
            None => {
                // Highest confidence overall; ties keep the sorted order
                let leader = sorted
                    .iter()
                    .fold(None::<&Claim>, |best, c| match best {
                        Some(b) if b.confidence >= c.confidence => Some(b),
                        _ => Some(c),
                    })
                    .unwrap_or(&sorted[0]);
                log.push_detail(
                    ReasonCode::R203_LOW_CONFIDENCE_FALLBACK,
                    format!("max confidence {:.2}", leader.confidence),
                );
                log.reason = ReasonCode::R203_LOW_CONFIDENCE_FALLBACK.description().to_string();
                Decision {
                    leader: leader.subsystem_id,
                    response: leader.response.clone(),
                    confidence: leader.confidence,
                    fallback: Some(DEFAULT_FALLBACK_RESPONSE.to_string()),
                    log,
                }
            }
        };

        if decision.leader != SubsystemId::TonalResonance {
            if let Some(tone) = sorted
                .iter()
                .find(|c| c.subsystem_id == SubsystemId::TonalResonance)
                .and_then(|c| c.metadata.tone)
            {
                decision.log.blend_tone = Some(tone);
                decision.log.push_detail(ReasonCode::R205_TONE_BLEND_REQUESTED, tone);
            }
        }

        debug!(leader = %decision.leader, confidence = decision.confidence, "claims resolved");
        decision
    }
}

/// Priority asc, confidence desc, subsystem id, response text
fn compare_claims(a: &Claim, b: &Claim) -> Ordering {
    a.effective_priority()
        .cmp(&b.effective_priority())
        .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal))
        .then_with(|| a.subsystem_id.cmp(&b.subsystem_id))
        .then_with(|| a.response.cmp(&b.response))
}

/// Post-pass forcing the fallback below a confidence floor. Idempotent.
#[derive(Debug, Clone)]
pub struct ConfidenceGovernor {
    threshold: f64,
}

impl Default for ConfidenceGovernor {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl ConfidenceGovernor {
    pub fn new(config: &ResolverConfig) -> Self {
        Self { threshold: config.governor_threshold }
    }

    pub fn govern(&self, mut decision: Decision) -> Decision {
        if decision.confidence >= self.threshold {
            return decision;
        }

        let fallback_text = decision
            .fallback
            .clone()
            .unwrap_or_else(|| DEFAULT_FALLBACK_RESPONSE.to_string());

        if decision.leader == SubsystemId::DefaultFallback && decision.response == fallback_text {
            return decision;
        }

        debug!(
            from = %decision.leader,
            confidence = decision.confidence,
            threshold = self.threshold,
            "governor forcing fallback"
        );
        decision.log.push_detail(
            ReasonCode::R206_GOVERNOR_OVERRIDE,
            format!("{} at {:.2}", decision.leader, decision.confidence),
        );
        decision.leader = SubsystemId::DefaultFallback;
        decision.response = fallback_text;
        decision
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::types::Tone;

    fn claim(id: SubsystemId, confidence: f64) -> Claim {
        Claim::new(id, confidence, format!("{} says", id), "test")
    }

    /// Deterministic claim sets covering every subsystem and a spread of confidences
    fn claim_sets() -> Vec<Vec<Claim>> {
        let ids = [
            SubsystemId::ExplicitBoundary,
            SubsystemId::Urgency,
            SubsystemId::Clarification,
            SubsystemId::ContemplativePause,
            SubsystemId::TonalResonance,
            SubsystemId::Narrative,
            SubsystemId::DefaultFallback,
        ];
        let confidences = [0.0, 0.1, 0.29, 0.3, 0.45, 0.8, 1.0];
        let mut sets = vec![Vec::new()];
        for (i, _) in ids.iter().enumerate() {
            let set: Vec<Claim> = ids
                .iter()
                .enumerate()
                .filter(|(j, _)| (i + j) % 3 != 0)
                .map(|(j, id)| claim(*id, confidences[(i * 3 + j) % confidences.len()]))
                .collect();
            sets.push(set);
        }
        sets
    }

    #[test]
    fn test_catastrophic_always_wins() {
        let resolver = PriorityResolver::default();
        for mut set in claim_sets() {
            set.push(claim(SubsystemId::CatastrophicGuard, 0.05));
            let decision = resolver.resolve(&set);
            assert_eq!(decision.leader, SubsystemId::CatastrophicGuard);
            assert_eq!(decision.confidence, 1.0);
        }
    }

    #[test]
    fn test_decision_always_has_response() {
        let resolver = PriorityResolver::default();
        let governor = ConfidenceGovernor::default();
        for set in claim_sets() {
            let decision = governor.govern(resolver.resolve(&set));
            assert!(!decision.response.is_empty(), "{:?}", set);
        }
    }

    #[test]
    fn test_empty_set() {
        let decision = PriorityResolver::default().resolve(&[]);
        assert_eq!(decision.leader, SubsystemId::DefaultFallback);
        assert_eq!(decision.response, DEFAULT_FALLBACK_RESPONSE);
        assert!(decision.log.contains(ReasonCode::R204_EMPTY_CLAIM_SET));
    }

    #[test]
    fn test_priority_beats_confidence() {
        let decision = PriorityResolver::default().resolve(&[
            claim(SubsystemId::Narrative, 0.95),
            claim(SubsystemId::Urgency, 0.5),
        ]);
        assert_eq!(decision.leader, SubsystemId::Urgency);
        assert!(decision.log.contains(ReasonCode::R202_CONFIDENT_LEADER));
    }

    #[test]
    fn test_unconfident_high_priority_skipped() {
        let decision = PriorityResolver::default().resolve(&[
            claim(SubsystemId::ExplicitBoundary, 0.2),
            claim(SubsystemId::Narrative, 0.6),
        ]);
        assert_eq!(decision.leader, SubsystemId::Narrative);
    }

    #[test]
    fn test_all_low_confidence_fallback() {
        let decision = PriorityResolver::default().resolve(&[
            claim(SubsystemId::Urgency, 0.1),
            claim(SubsystemId::Narrative, 0.25),
            claim(SubsystemId::TonalResonance, 0.2),
        ]);
        assert_eq!(decision.leader, SubsystemId::Narrative);
        assert_eq!(decision.confidence, 0.25);
        assert!(decision.fallback.is_some());
        assert!(decision.log.contains(ReasonCode::R203_LOW_CONFIDENCE_FALLBACK));
        assert!(decision.log.decision_path.iter().any(|p| p.contains("low confidence")));
    }

    #[test]
    fn test_ties_are_deterministic() {
        let a = Claim::new(SubsystemId::Narrative, 0.5, "b response", "x");
        let b = Claim::new(SubsystemId::Narrative, 0.5, "a response", "x");
        let first = PriorityResolver::default().resolve(&[a.clone(), b.clone()]);
        let second = PriorityResolver::default().resolve(&[b, a]);
        assert_eq!(first, second);
        assert_eq!(first.response, "a response");
    }

    #[test]
    fn test_tone_blend_annotated() {
        let tone = Claim::new(SubsystemId::TonalResonance, 0.6, "with you", "water")
            .with_tone(Some(Tone::Water));
        let decision = PriorityResolver::default().resolve(&[tone, claim(SubsystemId::Narrative, 0.6)]);
        assert_eq!(decision.leader, SubsystemId::TonalResonance);
        assert_eq!(decision.log.blend_tone, None);

        let tone = Claim::new(SubsystemId::TonalResonance, 0.6, "with you", "water")
            .with_tone(Some(Tone::Water));
        let decision = PriorityResolver::default().resolve(&[tone, claim(SubsystemId::Urgency, 0.7)]);
        assert_eq!(decision.leader, SubsystemId::Urgency);
        assert_eq!(decision.log.blend_tone, Some(Tone::Water));
        assert!(decision.log.contains(ReasonCode::R205_TONE_BLEND_REQUESTED));
    }

    #[test]
    fn test_governor_forces_fallback() {
        let resolver = PriorityResolver::default();
        let decision = resolver.resolve(&[claim(SubsystemId::Narrative, 0.35)]);
        let governed = ConfidenceGovernor::default().govern(decision);
        assert_eq!(governed.leader, SubsystemId::DefaultFallback);
        assert_eq!(governed.response, DEFAULT_FALLBACK_RESPONSE);
        assert!(governed.log.contains(ReasonCode::R206_GOVERNOR_OVERRIDE));
    }

    #[test]
    fn test_governor_idempotent() {
        let resolver = PriorityResolver::default();
        let governor = ConfidenceGovernor::default();
        for set in claim_sets() {
            let once = governor.govern(resolver.resolve(&set));
            let twice = governor.govern(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_governor_leaves_confident_decision() {
        let decision = PriorityResolver::default().resolve(&[claim(SubsystemId::Urgency, 0.8)]);
        let governed = ConfidenceGovernor::default().govern(decision.clone());
        assert_eq!(governed, decision);
    }
}
