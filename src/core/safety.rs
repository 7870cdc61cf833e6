//! Catastrophic safety gate
//!
//! Zero-tolerance keyword pass (confidence 1.0), then a contextual pass for
//! softer phrasing (confidence 0.8). Detections land in a bounded ring
//! buffer that stores a fingerprint, never the utterance.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, warn};

use crate::config::SafetyConfig;
use crate::core::collaborators::{ResourceRouter, StaticResourceRouter};
use crate::types::{DetectionRecord, ReasonCode, SafetyAssessment, SafetyCategory, SafetyStatus};
use crate::{SAFETY_CONTEXTUAL_CONFIDENCE, SAFETY_KEYWORD_CONFIDENCE};

/// Hex characters of the SHA-256 kept per record
const FINGERPRINT_LEN: usize = 16;

fn keyword_regex(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b({})\b", alternation)).unwrap()
}

lazy_static! {
    // =========================================================================
    // Keyword sets, checked in this order
    // =========================================================================
    static ref KEYWORDS: Vec<(SafetyCategory, Regex)> = vec![
        (SafetyCategory::MentalHealth, keyword_regex(&[
            "kill myself", "killing myself", "suicide", "suicidal", "end it all",
            "end my life", "want to die", "better off dead", "self harm", "self-harm",
            "cut myself", "hurt myself", "no reason to live", "take my own life",
        ])),
        (SafetyCategory::Medical, keyword_regex(&[
            "overdose", "overdosed", "can't breathe", "cannot breathe", "chest pain",
            "heart attack", "having a stroke", "seizure", "took too many pills",
            "bleeding heavily", "unconscious",
        ])),
        (SafetyCategory::Safety, keyword_regex(&[
            "going to kill me", "going to hurt me", "threatened to kill", "abusing me",
            "being abused", "i'm in danger", "i am in danger", "not safe at home",
            "has a gun", "has a knife",
        ])),
        (SafetyCategory::ExplicitBoundary, keyword_regex(&[
            "don't touch me", "stop touching me", "get away from me", "stop hurting me",
        ])),
        (SafetyCategory::TimeCritical, keyword_regex(&[
            "breaking in", "happening right now", "he's here right now", "she's here right now",
        ])),
        (SafetyCategory::HelpRequest, keyword_regex(&[
            "call 911", "call an ambulance", "call the police", "somebody help me",
            "someone help me",
        ])),
    ];

    // =========================================================================
    // Contextual patterns
    // =========================================================================
    static ref CONTEXTUAL: Vec<(SafetyCategory, Regex)> = vec![
        (SafetyCategory::MentalHealth, Regex::new(
            r"(?i)\b(can't|cannot) (go on|do this anymore|take (it|this) anymore|keep going)\b"
        ).unwrap()),
        (SafetyCategory::MentalHealth, Regex::new(
            r"(?i)\bno (point|reason) (in )?(living|going on|being here)\b"
        ).unwrap()),
        (SafetyCategory::MentalHealth, Regex::new(
            r"(?i)\b(everyone|they|everybody) would be better (off )?without me\b"
        ).unwrap()),
        (SafetyCategory::MentalHealth, Regex::new(
            r"(?i)\bwish i (could|would) (just )?(disappear|not wake up|never wake up)\b"
        ).unwrap()),
        (SafetyCategory::Safety, Regex::new(
            r"(?i)\b(he|she|they) (hit|hits|hurt|hurts|beat|beats|chokes|choked) me\b"
        ).unwrap()),
        (SafetyCategory::Safety, Regex::new(
            r"(?i)\bafraid (of|for) my life\b"
        ).unwrap()),
    ];
}

/// Catastrophic gate with detection history
pub struct CatastrophicGate {
    config: SafetyConfig,
    router: Arc<dyn ResourceRouter>,
    records: Mutex<VecDeque<DetectionRecord>>,
}

impl std::fmt::Debug for CatastrophicGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatastrophicGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for CatastrophicGate {
    fn default() -> Self {
        Self::new(SafetyConfig::default(), Arc::new(StaticResourceRouter::new()))
    }
}

impl CatastrophicGate {
    pub fn new(config: SafetyConfig, router: Arc<dyn ResourceRouter>) -> Self {
        let capacity = config.ring_capacity.max(1);
        Self {
            config,
            router,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Assess an utterance. `locale` falls back to the configured default when empty.
    pub fn assess(&self, utterance: &str, locale: &str) -> SafetyAssessment {
        let normalized = normalize(utterance);
        if normalized.is_empty() {
            return SafetyAssessment::clear();
        }

        let hit = KEYWORDS
            .iter()
            .find(|(_, re)| re.is_match(&normalized))
            .map(|(category, _)| (*category, SAFETY_KEYWORD_CONFIDENCE, ReasonCode::R101_CATASTROPHIC_OVERRIDE))
            .or_else(|| {
                CONTEXTUAL
                    .iter()
                    .find(|(_, re)| re.is_match(&normalized))
                    .map(|(category, _)| (*category, SAFETY_CONTEXTUAL_CONFIDENCE, ReasonCode::R102_CATASTROPHIC_CONTEXTUAL))
            });

        let Some((category, confidence, reason)) = hit else {
            return SafetyAssessment::clear();
        };

        let locale = if locale.trim().is_empty() { self.config.default_locale.as_str() } else { locale };
        let resources = self.router.resources(category, locale);
        let response = crisis_response(category, &resources);

        self.record(DetectionRecord {
            at: Utc::now(),
            category,
            confidence,
            fingerprint: fingerprint(&normalized),
        });

        warn!(
            category = %category,
            confidence,
            reason = reason.code(),
            "catastrophic content detected"
        );

        SafetyAssessment {
            detected: true,
            category: Some(category),
            confidence,
            response,
            resources,
            reason: Some(reason),
        }
    }

    /// Alerting status over the trailing window
    pub fn status(&self) -> SafetyStatus {
        self.status_at(Utc::now())
    }

    /// Status as of `now`
    pub fn status_at(&self, now: DateTime<Utc>) -> SafetyStatus {
        let window = Duration::seconds(self.config.alert_window_secs as i64);
        let recent = self
            .lock_records()
            .iter()
            .filter(|r| now - r.at <= window)
            .count();

        if recent >= self.config.critical_threshold {
            SafetyStatus::Critical
        } else if recent >= self.config.alert_threshold {
            SafetyStatus::Alert
        } else {
            SafetyStatus::Safe
        }
    }

    /// Snapshot of the ring buffer, oldest first
    pub fn recent_detections(&self) -> Vec<DetectionRecord> {
        self.lock_records().iter().cloned().collect()
    }

    fn record(&self, record: DetectionRecord) {
        let mut records = self.lock_records();
        records.push_back(record);
        while records.len() > self.config.ring_capacity.max(1) {
            records.pop_front();
        }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, VecDeque<DetectionRecord>> {
        // Ring buffer stays usable after a panic elsewhere
        self.records.lock().unwrap_or_else(|poisoned| {
            error!(category = "safety", "detection buffer lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    #[cfg(test)]
    fn push_record_at(&self, at: DateTime<Utc>) {
        self.record(DetectionRecord {
            at,
            category: SafetyCategory::MentalHealth,
            confidence: 1.0,
            fingerprint: String::new(),
        });
    }
}

/// Lowercase, straight apostrophes, collapsed whitespace
fn normalize(utterance: &str) -> String {
    utterance
        .replace(['\u{2019}', '\u{2018}'], "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Truncated SHA-256 of the normalized utterance
fn fingerprint(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Crisis script with resources embedded verbatim
fn crisis_response(category: SafetyCategory, resources: &[String]) -> String {
    let opening = match category {
        SafetyCategory::MentalHealth => {
            "I'm really glad you told me. What you're carrying matters, and you deserve support right now."
        }
        SafetyCategory::Medical => {
            "This sounds like it could be a medical emergency. Please get help right away."
        }
        SafetyCategory::Safety | SafetyCategory::TimeCritical => {
            "Your safety comes first. If you are in immediate danger, please get to a safe place and reach out now."
        }
        SafetyCategory::ExplicitBoundary => {
            "I hear you. Your safety matters, and you have every right to be safe."
        }
        SafetyCategory::HelpRequest => {
            "Please contact emergency help now. You don't have to handle this alone."
        }
    };

    let mut response = String::from(opening);
    if !resources.is_empty() {
        response.push_str("\n\nPlease reach out:");
        for resource in resources {
            response.push_str("\n- ");
            response.push_str(resource);
        }
    }
    response.push_str("\n\nI'm here with you.");
    response
}

// =============================================================================
// TESTS
// =============================================================================
