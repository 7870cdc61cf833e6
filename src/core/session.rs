//! Session manager
//!
//! Sessions are keyed by id, owned by the user that created them, and each
//! sits behind its own async mutex, so turns on one session are serialized
//! while other sessions proceed.
//!
//! Expiry is lazy: an idle session is reset when it is next acquired and
//! keeps its id. The background sweep only frees memory and never evicts
//! a session that a turn is holding.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{ArbiterError, ArbiterResult};
use crate::types::{Depth, Session};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Per-user default session id
pub fn default_session_id(user_id: &str) -> String {
    format!("{}:default", user_id)
}

#[derive(Debug)]
struct SessionEntry {
    owner: String,
    handle: SessionHandle,
}

impl SessionEntry {
    /// Handle for `user_id`, or an error if another user owns the session
    fn handle_for(&self, session_id: &str, user_id: &str) -> ArbiterResult<SessionHandle> {
        if self.owner != user_id {
            warn!(
                category = "invalid_context",
                session_id,
                timestamp = %Utc::now().to_rfc3339(),
                "session requested by a user that does not own it"
            );
            return Err(ArbiterError::InvalidContext(format!(
                "session {} does not belong to user {}",
                session_id, user_id
            )));
        }
        Ok(Arc::clone(&self.handle))
    }
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    config: SessionConfig,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for a session, created on first use
    ///
    /// `seed_exchange` only applies to a newly created session; negative
    /// values are clamped to zero. A session id owned by another user is
    /// an `InvalidContext` error.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        seed_exchange: Option<i64>,
    ) -> ArbiterResult<SessionHandle> {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| default_session_id(user_id));

        if let Some(entry) = self.sessions.read().await.get(&id) {
            return entry.handle_for(&id, user_id);
        }

        let mut sessions = self.sessions.write().await;
        // Another turn may have created it between the two locks
        if let Some(entry) = sessions.get(&id) {
            return entry.handle_for(&id, user_id);
        }

        let mut session = Session::new(id.clone(), user_id, self.config.max_history);
        if let Some(seed) = seed_exchange {
            if seed < 0 {
                warn!(
                    category = "invalid_context",
                    session_id = %id,
                    timestamp = %Utc::now().to_rfc3339(),
                    exchange_count = seed,
                    "negative exchange count clamped to 0"
                );
            }
            session.exchange_count = seed.max(0) as u64;
            session.depth = Depth::from_exchange_count(session.exchange_count);
        }

        debug!(session_id = %id, user_id, "session created");
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(id, SessionEntry { owner: user_id.to_string(), handle: Arc::clone(&handle) });
        Ok(handle)
    }

    /// Lock a session for a turn, resetting it first if it went idle
    pub async fn acquire(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        seed_exchange: Option<i64>,
    ) -> ArbiterResult<OwnedMutexGuard<Session>> {
        let handle = self.get_or_create(user_id, session_id, seed_exchange).await?;
        let mut session = handle.lock_owned().await;
        if session.is_idle(Utc::now(), self.config.idle_timeout()) {
            info!(
                session_id = %session.id,
                exchange_count = session.exchange_count,
                "idle session reset on access"
            );
            session.reset();
        }
        Ok(session)
    }

    /// Copy of a session's current state, without counting as access
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let handle = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| Arc::clone(&entry.handle))?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Evict idle sessions nobody is holding. Returns the evicted ids.
    pub async fn sweep(&self) -> Vec<String> {
        let now = Utc::now();
        let timeout = self.config.idle_timeout();
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();

        sessions.retain(|id, entry| {
            if Arc::strong_count(&entry.handle) > 1 {
                return true;
            }
            let keep = match entry.handle.try_lock() {
                Ok(session) => !session.is_idle(now, timeout),
                Err(_) => true,
            };
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });

        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), remaining = sessions.len(), "idle sessions evicted");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::types::SubsystemId;

    fn manager() -> SessionManager {
        SessionManager::default()
    }

    #[tokio::test]
    async fn test_default_session_id() {
        let manager = manager();
        let session = manager.acquire("alice", None, None).await.unwrap();
        assert_eq!(session.id, "alice:default");
        assert_eq!(session.depth, Depth::Surface);
        assert_eq!(session.exchange_count, 0);
    }

    #[tokio::test]
    async fn test_same_id_same_session() {
        let manager = manager();
        let a = manager.get_or_create("u", Some("s1"), None).await.unwrap();
        let b = manager.get_or_create("u", Some("s1"), None).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_seed_applies_only_on_creation() {
        let manager = manager();
        {
            let session = manager.acquire("u", Some("s1"), Some(6)).await.unwrap();
            assert_eq!(session.exchange_count, 6);
            assert_eq!(session.depth, Depth::Deep);
        }
        let session = manager.acquire("u", Some("s1"), Some(1)).await.unwrap();
        assert_eq!(session.exchange_count, 6);
    }

    #[tokio::test]
    async fn test_negative_seed_clamped() {
        let manager = manager();
        let session = manager.acquire("u", None, Some(-4)).await.unwrap();
        assert_eq!(session.exchange_count, 0);
    }

    #[tokio::test]
    async fn test_idle_session_reset_keeps_id() {
        let manager = manager();
        {
            let mut session = manager.acquire("u", Some("s1"), None).await.unwrap();
            session.record_exchange("hi", "hello", SubsystemId::Narrative, None);
            session.record_exchange("more", "go on", SubsystemId::Narrative, None);
            session.last_activity = Utc::now() - Duration::hours(2);
        }
        let session = manager.acquire("u", Some("s1"), None).await.unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.exchange_count, 0);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_other_users_session_rejected() {
        let manager = manager();
        {
            let mut session = manager.acquire("alice", None, None).await.unwrap();
            session.record_exchange("hi", "hello", SubsystemId::Narrative, None);
        }

        let err = manager.acquire("mallory", Some("alice:default"), None).await.unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidContext(_)));
        assert!(manager.get_or_create("mallory", Some("alice:default"), None).await.is_err());

        let session = manager.snapshot("alice:default").await.unwrap();
        assert_eq!(session.user_id, "alice");
        assert_eq!(session.exchange_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_missing_session() {
        assert!(manager().snapshot("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_only() {
        let manager = manager();
        {
            let mut idle = manager.acquire("u", Some("idle"), None).await.unwrap();
            idle.last_activity = Utc::now() - Duration::hours(2);
        }
        drop(manager.acquire("u", Some("fresh"), None).await.unwrap());

        assert_eq!(manager.sweep().await, vec!["idle".to_string()]);
        assert!(manager.snapshot("idle").await.is_none());
        assert!(manager.snapshot("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_skips_held_session() {
        let manager = manager();
        let mut held = manager.acquire("u", Some("busy"), None).await.unwrap();
        held.last_activity = Utc::now() - Duration::hours(2);

        assert!(manager.sweep().await.is_empty());
        assert_eq!(manager.len().await, 1);
        drop(held);
        assert_eq!(manager.sweep().await.len(), 1);
    }

    #[tokio::test]
    async fn test_evicted_session_recreated_with_same_id() {
        let manager = manager();
        {
            let mut session = manager.acquire("u", Some("s1"), None).await.unwrap();
            session.record_exchange("hi", "hello", SubsystemId::Narrative, None);
            session.last_activity = Utc::now() - Duration::hours(2);
        }
        manager.sweep().await;
        let session = manager.acquire("u", Some("s1"), None).await.unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.exchange_count, 0);
    }
}
