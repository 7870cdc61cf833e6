//! Per-turn input and the context handed to detectors

use serde::{Deserialize, Serialize};
use crate::error::ArbiterError;
use crate::types::{Depth, IntensityProfile, SpiralPhase, Tone};

fn default_assistant_name() -> String {
    "Companion".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// User-level preferences carried with every turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub looping_intensity: IntensityProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_tone: Option<Tone>,
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// BCP-47-ish locale used for resource routing
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            looping_intensity: IntensityProfile::default(),
            preferred_tone: None,
            assistant_name: default_assistant_name(),
            locale: default_locale(),
        }
    }
}

/// Input for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    pub utterance: String,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<String>,
    #[serde(default)]
    pub current_tone: Option<Tone>,
    #[serde(default)]
    pub emotional_intensity: Option<f64>,
    #[serde(default)]
    pub depth: Option<Depth>,
    /// Client-reported exchange count; seeds a newly created session
    #[serde(default)]
    pub exchange_count: Option<i64>,
    #[serde(default)]
    pub spiral_phase: Option<SpiralPhase>,
    #[serde(default)]
    pub user_preferences: UserPreferences,
}

impl TurnInput {
    /// Minimal input for a user and utterance
    pub fn new(user_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_profile(mut self, profile: IntensityProfile) -> Self {
        self.user_preferences.looping_intensity = profile;
        self
    }

    /// Required identifiers must be present
    pub fn validate(&self) -> Result<(), ArbiterError> {
        if self.user_id.trim().is_empty() {
            return Err(ArbiterError::InvalidContext("user_id is required".into()));
        }
        if let Some(ref id) = self.session_id {
            if id.trim().is_empty() {
                return Err(ArbiterError::InvalidContext("session_id must not be blank".into()));
            }
        }
        Ok(())
    }
}

/// What a detector sees about the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    pub session_id: String,
    pub user_id: String,
    pub exchange_count: u64,
    pub depth: Depth,
    pub current_tone: Option<Tone>,
    /// 0.0-1.0
    pub emotional_intensity: f64,
    /// Recent user utterances, oldest first
    pub recent_history: Vec<String>,
    pub spiral_phase: SpiralPhase,
    pub preferences: UserPreferences,
    /// A clarification loop is awaiting a reply
    pub loop_active: bool,
    /// The catastrophic gate already assessed this utterance and found nothing
    #[serde(default)]
    pub safety_cleared: bool,
}

impl TurnContext {
    /// Context for tests and standalone detector use
    pub fn detached(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            session_id: format!("{}:default", user_id),
            user_id,
            exchange_count: 0,
            depth: Depth::Surface,
            current_tone: None,
            emotional_intensity: 0.0,
            recent_history: Vec::new(),
            spiral_phase: SpiralPhase::default(),
            preferences: UserPreferences::default(),
            loop_active: false,
            safety_cleared: false,
        }
    }
}
