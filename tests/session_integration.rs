//! Integration tests for sessions
//!
//! Expiry, seeding and per-session serialization through the orchestrator

use std::sync::Arc;
use arbiter::config::{ArbiterConfig, SessionConfig};
use arbiter::core::{InMemoryStore, Orchestrator};
use arbiter::error::ArbiterError;
use arbiter::types::{Depth, SubsystemId, TurnInput};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

const STORY: &str = "Yesterday I walked to the old harbour and then we talked about the boats.";

#[tokio::test]
async fn test_missing_user_id_rejected() {
    let orchestrator = Orchestrator::default();
    let result = orchestrator.process_turn(TurnInput::new("  ", STORY)).await;
    assert!(matches!(result, Err(ArbiterError::InvalidContext(_))));

    let result = orchestrator.handle_silence("", None).await;
    assert!(matches!(result, Err(ArbiterError::InvalidContext(_))));
}

#[tokio::test]
async fn test_explicit_session_ids_are_independent() {
    let orchestrator = Orchestrator::default();
    orchestrator
        .process_turn(TurnInput::new("u1", STORY).with_session("morning"))
        .await
        .unwrap();
    orchestrator
        .process_turn(TurnInput::new("u1", STORY).with_session("morning"))
        .await
        .unwrap();
    let evening = orchestrator
        .process_turn(TurnInput::new("u1", STORY).with_session("evening"))
        .await
        .unwrap();

    assert_eq!(evening.session_id, "evening");
    assert_eq!(evening.exchange_count, 1);
    let morning = orchestrator.session_snapshot("morning").await.unwrap();
    assert_eq!(morning.exchange_count, 2);
    assert_eq!(morning.history.len(), 4);
    assert!(morning.active_protocols.contains(&SubsystemId::Narrative));
}

#[tokio::test]
async fn test_idle_session_resets_on_access() {
    let orchestrator = Orchestrator::default();
    for _ in 0..3 {
        orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    }
    {
        let mut session = orchestrator.sessions().acquire("u1", None, None).await.unwrap();
        session.last_activity = Utc::now() - Duration::hours(2);
    }

    let outcome = orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    assert_eq!(outcome.session_id, "u1:default");
    assert_eq!(outcome.exchange_count, 1);
    assert_eq!(outcome.depth, Depth::Surface);

    let session = orchestrator.session_snapshot("u1:default").await.unwrap();
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn test_client_exchange_count_seeds_new_session() {
    let orchestrator = Orchestrator::default();
    let mut input = TurnInput::new("u1", STORY);
    input.exchange_count = Some(5);
    let outcome = orchestrator.process_turn(input).await.unwrap();
    assert_eq!(outcome.exchange_count, 6);
    assert_eq!(outcome.depth, Depth::Deep);

    let mut negative = TurnInput::new("u2", STORY);
    negative.exchange_count = Some(-3);
    let outcome = orchestrator.process_turn(negative).await.unwrap();
    assert_eq!(outcome.exchange_count, 1);
}

#[tokio::test]
async fn test_history_trimmed_to_cap() {
    let config = ArbiterConfig {
        session: SessionConfig { max_history: 4, ..SessionConfig::default() },
        ..ArbiterConfig::default()
    };
    let orchestrator = Orchestrator::new(config);
    for _ in 0..5 {
        orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    }
    let session = orchestrator.session_snapshot("u1:default").await.unwrap();
    assert_eq!(session.history.len(), 4);
    assert_eq!(session.exchange_count, 5);
}

#[tokio::test]
async fn test_concurrent_turns_serialize_per_session() {
    let orchestrator = Arc::new(Orchestrator::default());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.process_turn(TurnInput::new("u1", STORY)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let session = orchestrator.session_snapshot("u1:default").await.unwrap();
    assert_eq!(session.exchange_count, 16);
    assert_eq!(orchestrator.metrics("u1:default").unwrap().metrics.turns, 16);
}

#[tokio::test]
async fn test_sweep_then_new_turn_recreates_session() {
    let orchestrator = Orchestrator::default();
    orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    {
        let mut session = orchestrator.sessions().acquire("u1", None, None).await.unwrap();
        session.last_activity = Utc::now() - Duration::hours(2);
    }
    assert_eq!(orchestrator.sweep().await, 1);
    assert!(orchestrator.session_snapshot("u1:default").await.is_none());

    let outcome = orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    assert_eq!(outcome.session_id, "u1:default");
    assert_eq!(outcome.exchange_count, 1);
}

#[tokio::test]
async fn test_sweep_releases_monitor_metrics() {
    let config = ArbiterConfig {
        session: SessionConfig { idle_timeout_secs: 0, ..SessionConfig::default() },
        ..ArbiterConfig::default()
    };
    let orchestrator = Orchestrator::new(config);
    for i in 0..20 {
        orchestrator
            .process_turn(TurnInput::new("u1", STORY).with_session(format!("s{}", i)))
            .await
            .unwrap();
    }
    assert_eq!(orchestrator.monitor_summary().sessions, 20);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(orchestrator.sweep().await, 20);
    assert!(orchestrator.sessions().is_empty().await);
    assert_eq!(orchestrator.monitor_summary().sessions, 0);
    assert!(orchestrator.metrics("s0").is_none());
}

#[tokio::test]
async fn test_session_of_another_user_is_rejected() {
    let orchestrator = Orchestrator::default();
    orchestrator.process_turn(TurnInput::new("alice", STORY)).await.unwrap();

    let result = orchestrator
        .process_turn(TurnInput::new("mallory", "hello there").with_session("alice:default"))
        .await;
    assert!(matches!(result, Err(ArbiterError::InvalidContext(_))));

    let result = orchestrator.handle_silence("mallory", Some("alice:default")).await;
    assert!(matches!(result, Err(ArbiterError::InvalidContext(_))));

    let session = orchestrator.session_snapshot("alice:default").await.unwrap();
    assert_eq!(session.user_id, "alice");
    assert_eq!(session.exchange_count, 1);
    assert_eq!(session.history.len(), 2);
}

#[tokio::test]
async fn test_memory_store_sees_every_turn() {
    let memory = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::default().with_memory(memory.clone());
    orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();
    orchestrator.process_turn(TurnInput::new("u1", STORY)).await.unwrap();

    let summaries = memory.summaries("u1").await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].exchange_count, 2);
    assert_eq!(summaries[1].depth, Depth::Moderate);
}
