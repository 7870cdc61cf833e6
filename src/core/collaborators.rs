//! External collaborators: interfaces plus the built-in defaults
//!
//! None of these can fail a turn. The orchestrator logs their errors and
//! carries on with the core's own directive text.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CollaboratorError;
use crate::types::{AudioHandle, Depth, SafetyCategory, SubsystemId, Tone};

/// What the core asks the drafting collaborator to phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDirective {
    pub leader: SubsystemId,
    /// Core-produced text the prose must stay faithful to
    pub skeleton: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    /// Tone the resolver asked to blend in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_tone: Option<Tone>,
    pub assistant_name: String,
}

/// Turns directives into final prose. Never consulted for safety or boundary scripts.
#[async_trait]
pub trait DraftingOracle: Send + Sync {
    async fn draft(&self, directive: &DraftDirective) -> Result<String, CollaboratorError>;
}

/// Text to audio; absence is fine
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, tone: Option<Tone>) -> Result<AudioHandle, CollaboratorError>;
}

/// Summary written after each turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub exchange_count: u64,
    pub depth: Depth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tone: Option<Tone>,
    pub last_leader: SubsystemId,
    pub at: DateTime<Utc>,
}

/// Best-effort journal / long-term memory
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Recent user utterances for a user, oldest first
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<String>, CollaboratorError>;

    async fn write_summary(&self, summary: &SessionSummary) -> Result<(), CollaboratorError>;
}

/// Category + locale to region-appropriate resource strings
pub trait ResourceRouter: Send + Sync {
    fn resources(&self, category: SafetyCategory, locale: &str) -> Vec<String>;
}

// =============================================================================
// DEFAULTS
// =============================================================================

/// Fixed resource table keyed by locale
#[derive(Debug, Default)]
pub struct StaticResourceRouter;

impl StaticResourceRouter {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceRouter for StaticResourceRouter {
    fn resources(&self, category: SafetyCategory, locale: &str) -> Vec<String> {
        let region = locale.rsplit(['-', '_']).next().unwrap_or("").to_ascii_uppercase();
        let crisis_line = matches!(category, SafetyCategory::MentalHealth | SafetyCategory::Safety);

        let mut resources = Vec::new();
        match region.as_str() {
            "US" => {
                if crisis_line {
                    resources.push("988 Suicide & Crisis Lifeline: call or text 988".to_string());
                    resources.push("Crisis Text Line: text HOME to 741741".to_string());
                }
                resources.push("Emergency services: 911".to_string());
            }
            "GB" | "UK" => {
                if crisis_line {
                    resources.push("Samaritans: call 116 123".to_string());
                }
                resources.push("Emergency services: 999".to_string());
            }
            "NL" => {
                if crisis_line {
                    resources.push("113 Zelfmoordpreventie: call 113 or 0800-0113".to_string());
                }
                resources.push("Emergency services: 112".to_string());
            }
            _ => {
                if crisis_line {
                    resources.push(
                        "International Association for Suicide Prevention crisis centres: https://www.iasp.info/resources/Crisis_Centres/".to_string(),
                    );
                }
                resources.push("Your local emergency services number".to_string());
            }
        }
        resources
    }
}

/// In-process memory store keyed by user
#[derive(Debug, Default)]
pub struct InMemoryStore {
    summaries: Mutex<HashMap<String, Vec<SessionSummary>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All summaries written for a user
    pub async fn summaries(&self, user_id: &str) -> Vec<SessionSummary> {
        self.summaries.lock().await.get(user_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<String>, CollaboratorError> {
        // Summaries carry no utterance text
        Ok(Vec::new())
    }

    async fn write_summary(&self, summary: &SessionSummary) -> Result<(), CollaboratorError> {
        self.summaries
            .lock()
            .await
            .entry(summary.user_id.clone())
            .or_default()
            .push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_mental_health_resources() {
        let resources = StaticResourceRouter::new().resources(SafetyCategory::MentalHealth, "en-US");
        assert!(resources.iter().any(|r| r.contains("988")));
        assert!(resources.iter().any(|r| r.contains("911")));
    }

    #[test]
    fn test_medical_has_no_crisis_line() {
        let resources = StaticResourceRouter::new().resources(SafetyCategory::Medical, "en-GB");
        assert_eq!(resources, vec!["Emergency services: 999".to_string()]);
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        let resources = StaticResourceRouter::new().resources(SafetyCategory::MentalHealth, "xx");
        assert_eq!(resources.len(), 2);
        assert!(resources[0].contains("iasp"));
    }

    #[tokio::test]
    async fn test_in_memory_store_records_summaries() {
        let store = InMemoryStore::new();
        let summary = SessionSummary {
            session_id: "u1:default".into(),
            user_id: "u1".into(),
            exchange_count: 1,
            depth: Depth::Surface,
            current_tone: None,
            last_leader: SubsystemId::Narrative,
            at: Utc::now(),
        };
        store.write_summary(&summary).await.unwrap();
        assert_eq!(store.summaries("u1").await.len(), 1);
        assert!(store.summaries("u2").await.is_empty());
    }
}
