//! Contract Test: State Is Persisted Once Per Cycle
//!
//! Constraints verified:
//! - Exactly one save per cycle, whatever the outcome
//! - A failed save is reported, and the in-memory state still advances so
//!   the next cycle does not repeat the update
//! - A failed load starts from empty state instead of failing the cycle
//! - The store is read once; later cycles use the engine's own copy
//! - File store state survives an engine restart
//! - Timeouts too large to form a deadline are refused before any cycle runs

mod common;

use chrono::Utc;
use common::*;
use hostup_core::engine::{EngineEvent, ReconciliationEngine, UpdateOutcome};
use hostup_core::error::{ProviderError, ResolutionError, StorageError};
use hostup_core::shutdown::Shutdown;
use hostup_core::state::FileStateStore;
use hostup_core::traits::{ReconciliationState, StateStore};

#[tokio::test]
async fn every_outcome_persists_exactly_once() {
    let shutdown = Shutdown::never();

    // Updated
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();
    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    engine.run_cycle(&shutdown).await;
    assert_eq!(store.save_count(), 1);

    // NoChangeNeeded
    engine.run_cycle(&shutdown).await;
    assert_eq!(store.save_count(), 2);

    // Fatal provider failure
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new().always_fail(ProviderError::AuthFailure("k".into()));
    let store = CountingStateStore::new();
    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    engine.run_cycle(&shutdown).await;
    assert_eq!(store.save_count(), 1);

    // Resolution failure
    let resolver = ScriptedResolver::always(ip("1.2.3.4"))
        .then(Err(ResolutionError::MalformedResponse("<html>".into())));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();
    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    engine.run_cycle(&shutdown).await;
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn failed_save_is_reported_but_not_repeated_work() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();
    store.fail_saves(true);

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let shutdown = Shutdown::never();

    let report = engine.run_cycle(&shutdown).await;
    assert_eq!(report.outcome, UpdateOutcome::Updated(record("1.2.3.4")));
    assert!(matches!(report.persist_error, Some(StorageError::Io(_))));
    assert!(
        drain_events(&mut event_rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::PersistFailed { .. }))
    );

    let report = engine.run_cycle(&shutdown).await;
    assert_eq!(report.outcome, UpdateOutcome::NoChangeNeeded);
    assert_eq!(
        provider.update_call_count(),
        1,
        "A failed save must not cause the update to be repeated"
    );
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn failed_load_starts_from_empty_state() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new().with_state(ReconciliationState {
        last_applied_address: Some(record("1.2.3.4")),
        last_success_timestamp: Some(Utc::now()),
        ..Default::default()
    });
    store.fail_loads(true);

    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    // Without readable state the engine cannot know the record is current
    assert_eq!(report.outcome, UpdateOutcome::Updated(record("1.2.3.4")));
    assert!(report.persist_error.is_none());
}

#[tokio::test]
async fn store_is_read_only_once() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();

    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    let shutdown = Shutdown::never();
    for _ in 0..3 {
        engine.run_cycle(&shutdown).await;
    }

    assert_eq!(store.load_count(), 1);
    assert_eq!(store.save_count(), 3);
}

#[tokio::test]
async fn report_state_matches_saved_state() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();

    let (engine, _rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(store.saved(), Some(report.state.clone()));
    assert_eq!(engine.current_state().await, report.state);
}

#[tokio::test]
async fn oversized_cycle_timeout_is_refused_at_construction() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();
    let mut config = test_config();
    config.engine.cycle_timeout_secs = u64::MAX;

    let result = ReconciliationEngine::new(
        Box::new(ScriptedResolver::sharing_counters_with(&resolver)),
        Box::new(ScriptedProvider::sharing_counters_with(&provider)),
        Box::new(CountingStateStore::sharing_counters_with(&store)),
        config,
    );

    assert!(result.is_err());
    assert_eq!(store.load_count(), 0);
}

#[tokio::test]
async fn file_store_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new();

    {
        let (engine, _rx) = ReconciliationEngine::new(
            Box::new(ScriptedResolver::sharing_counters_with(&resolver)),
            Box::new(ScriptedProvider::sharing_counters_with(&provider)),
            Box::new(FileStateStore::new(&path).await.unwrap()),
            test_config(),
        )
        .unwrap();
        engine.run_cycle(&Shutdown::never()).await;
    }

    let persisted = FileStateStore::new(&path).await.unwrap().load().await.unwrap();
    assert_eq!(persisted.last_applied_address, Some(record("1.2.3.4")));

    let (engine, _rx) = ReconciliationEngine::new(
        Box::new(ScriptedResolver::sharing_counters_with(&resolver)),
        Box::new(ScriptedProvider::sharing_counters_with(&provider)),
        Box::new(FileStateStore::new(&path).await.unwrap()),
        test_config(),
    )
    .unwrap();
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(report.outcome, UpdateOutcome::NoChangeNeeded);
    assert_eq!(
        provider.update_call_count(),
        1,
        "A restart must not push an address that was already applied"
    );
}
