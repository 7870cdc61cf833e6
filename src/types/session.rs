//! Session model: per-conversation state owned by the engine
//!
//! - History is bounded, oldest entries evicted first
//! - Depth follows exchange count (<2 surface, >5 deep)
//! - Reset keeps the id

use std::collections::{BTreeSet, VecDeque};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use crate::types::{Depth, LoopingState, SubsystemId, Tone};

/// Who said a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    /// Leader that produced an assistant entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<SubsystemId>,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            leader: None,
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>, leader: SubsystemId) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            leader: Some(leader),
            at: Utc::now(),
        }
    }
}

/// Bounded conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    max_len: usize,
}

impl ConversationHistory {
    /// Create history with a maximum length (at least 1)
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    /// Add an entry and evict the oldest beyond capacity
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent `n` user utterances, oldest first
    pub fn recent_user_texts(&self, n: usize) -> Vec<String> {
        let mut texts: Vec<String> = self.entries.iter()
            .rev()
            .filter(|e| e.role == Role::User)
            .take(n)
            .map(|e| e.text.clone())
            .collect();
        texts.reverse();
        texts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Per-conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub exchange_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_tone: Option<Tone>,
    pub depth: Depth,
    pub history: ConversationHistory,
    pub active_protocols: BTreeSet<SubsystemId>,
    pub last_activity: DateTime<Utc>,
    /// Clarification loop awaiting a reply, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_state: Option<LoopingState>,
    /// Loops started in the current exchange; cleared by the next ordinary turn
    pub loop_attempts: u32,
}

impl Session {
    /// Fresh session
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            start_time: now,
            exchange_count: 0,
            current_tone: None,
            depth: Depth::Surface,
            history: ConversationHistory::new(max_history),
            active_protocols: BTreeSet::new(),
            last_activity: now,
            loop_state: None,
            loop_attempts: 0,
        }
    }

    /// Has this session been idle longer than `timeout`?
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }

    /// Reset counters, history and loop state; id and user are preserved
    pub fn reset(&mut self) {
        let now = Utc::now();
        self.start_time = now;
        self.exchange_count = 0;
        self.current_tone = None;
        self.depth = Depth::Surface;
        self.history.clear();
        self.active_protocols.clear();
        self.last_activity = now;
        self.loop_state = None;
        self.loop_attempts = 0;
    }

    /// Fold one completed turn into the session
    pub fn record_exchange(
        &mut self,
        user_text: &str,
        response: &str,
        leader: SubsystemId,
        tone: Option<Tone>,
    ) {
        self.history.push(HistoryEntry::user(user_text));
        self.history.push(HistoryEntry::assistant(response, leader));
        self.exchange_count += 1;
        self.depth = Depth::from_exchange_count(self.exchange_count);
        self.active_protocols.insert(leader);
        if tone.is_some() {
            self.current_tone = tone;
        }
        self.last_activity = Utc::now();
    }

    /// Mark activity without recording an exchange
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

// =============================================================================
// TESTS
// =============================================================================
