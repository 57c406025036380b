//! Architectural Contract Test: Engine-Owned Retry Logic
//!
//! Retry policy lives in the engine. Providers only classify failures; the
//! engine decides what is retried, how long to wait and when to give up.
//!
//! Constraints verified:
//! - Rate limits and transient failures are retried with exponential backoff
//! - A provider `retry_after` hint raises the delay
//! - Auth, invalid-request and not-found failures are never retried and raise an alert
//! - Retries stop at `max_retries`, and can be disabled entirely
//! - A failed resolution never reaches the provider
//! - A backoff that would pass the cycle deadline is not attempted
//!
//! If this test fails, someone has moved retry logic to the wrong layer
//! or made the retry budget implicit.

mod common;

use common::*;
use hostup_core::engine::{EngineEvent, FailureKind, UpdateOutcome};
use hostup_core::error::{ProviderError, ResolutionError};
use hostup_core::shutdown::Shutdown;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_then_succeed() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new()
        .then_fail(ProviderError::RateLimited { retry_after: None })
        .then_fail(ProviderError::RateLimited { retry_after: None })
        .then_fail(ProviderError::RateLimited { retry_after: None });
    let store = CountingStateStore::new();

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(report.outcome, UpdateOutcome::Updated(record("1.2.3.4")));
    assert_eq!(report.attempts, 4);
    assert_eq!(report.state.consecutive_failure_count, 0);

    let events = drain_events(&mut event_rx);
    assert_eq!(
        retry_delays(&events),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ],
        "Expected three exponentially growing backoff delays"
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::UpdateSucceeded { .. }))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_raises_delay() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new().then_fail(ProviderError::RateLimited {
        retry_after: Some(Duration::from_millis(700)),
    });
    let store = CountingStateStore::new();

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let started = tokio::time::Instant::now();
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert!(!report.outcome.is_failure());
    assert_eq!(
        retry_delays(&drain_events(&mut event_rx)),
        vec![Duration::from_millis(700)]
    );
    assert!(started.elapsed() >= Duration::from_millis(700));
}

#[tokio::test]
async fn auth_failure_is_fatal_and_alerts() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider =
        ScriptedProvider::new().always_fail(ProviderError::AuthFailure("invalid API key".into()));
    let store = CountingStateStore::new();

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(
        provider.update_call_count(),
        1,
        "Fatal provider errors must not be retried"
    );
    assert!(report.outcome.is_fatal());
    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed {
            kind: FailureKind::Provider(ProviderError::AuthFailure(_)),
            retryable: false,
        }
    ));
    assert_eq!(report.state.consecutive_failure_count, 1);
    assert_eq!(store.saved().unwrap().consecutive_failure_count, 1);

    let events = drain_events(&mut event_rx);
    assert!(events.iter().any(|e| matches!(e, EngineEvent::OperatorAlert { .. })));
    assert!(retry_delays(&events).is_empty());
}

#[tokio::test]
async fn invalid_request_and_not_found_are_fatal() {
    for error in [
        ProviderError::InvalidRequest("bad value".into()),
        ProviderError::NotFound("no zone for home.example.org".into()),
    ] {
        let resolver = ScriptedResolver::always(ip("1.2.3.4"));
        let provider = ScriptedProvider::new().always_fail(error);
        let store = CountingStateStore::new();

        let (engine, _event_rx) = build_engine(&resolver, &provider, &store, test_config());
        let report = engine.run_cycle(&Shutdown::never()).await;

        assert!(report.outcome.is_fatal());
        assert_eq!(provider.update_call_count(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_retry_budget() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new().always_fail(ProviderError::Transient("503".into()));
    let store = CountingStateStore::new();

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    // One attempt plus max_retries (3) retries
    assert_eq!(provider.update_call_count(), 4);
    assert_eq!(report.attempts, 4);
    assert!(report.outcome.is_failure());
    assert!(!report.outcome.is_fatal());
    assert_eq!(report.state.consecutive_failure_count, 1);
    assert_eq!(retry_delays(&drain_events(&mut event_rx)).len(), 3);

    // The next cycle starts a fresh budget and counts another failure
    let report = engine.run_cycle(&Shutdown::never()).await;
    assert_eq!(provider.update_call_count(), 8);
    assert_eq!(report.state.consecutive_failure_count, 2);
}

#[tokio::test]
async fn retries_can_be_disabled_via_config() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new().always_fail(ProviderError::Transient("503".into()));
    let store = CountingStateStore::new();

    let mut config = test_config();
    config.engine.max_retries = 0;

    let (engine, _event_rx) = build_engine(&resolver, &provider, &store, config);
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(
        provider.update_call_count(),
        1,
        "Expected exactly 1 DNS update attempt with max_retries=0"
    );
    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed { retryable: true, .. }
    ));
}

#[tokio::test]
async fn resolution_failure_never_reaches_provider() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"))
        .then(Err(ResolutionError::Unreachable("connection refused".into())));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();

    let (engine, _event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(provider.update_call_count(), 0);
    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed {
            kind: FailureKind::Resolution(ResolutionError::Unreachable(_)),
            retryable: true,
        }
    ));
    assert_eq!(report.state.consecutive_failure_count, 1);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_resolver_times_out() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4")).with_delay(Duration::from_secs(30));
    let provider = ScriptedProvider::new();
    let store = CountingStateStore::new();

    let (engine, _event_rx) = build_engine(&resolver, &provider, &store, test_config());
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed {
            kind: FailureKind::Resolution(ResolutionError::Timeout(_)),
            ..
        }
    ));
    assert_eq!(provider.update_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backoff_past_deadline_is_not_attempted() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new().always_fail(ProviderError::Transient("503".into()));
    let store = CountingStateStore::new();

    let mut config = test_config();
    config.engine.cycle_timeout_secs = 10;
    config.engine.initial_backoff_ms = 20_000;
    config.engine.max_backoff_ms = 60_000;

    let (engine, mut event_rx) = build_engine(&resolver, &provider, &store, config);
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert_eq!(provider.update_call_count(), 1);
    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed {
            kind: FailureKind::Provider(ProviderError::Transient(_)),
            retryable: true,
        }
    ));
    assert!(retry_delays(&drain_events(&mut event_rx)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn cycle_deadline_bounds_slow_retries() {
    let resolver = ScriptedResolver::always(ip("1.2.3.4"));
    let provider = ScriptedProvider::new()
        .always_fail(ProviderError::Transient("503".into()))
        .with_delay(Duration::from_secs(4));
    let store = CountingStateStore::new();

    let mut config = test_config();
    config.engine.cycle_timeout_secs = 8;
    config.engine.max_retries = 10;

    let (engine, _event_rx) = build_engine(&resolver, &provider, &store, config);
    let report = engine.run_cycle(&Shutdown::never()).await;

    assert!(matches!(
        report.outcome,
        UpdateOutcome::Failed {
            kind: FailureKind::CycleTimeout,
            retryable: true,
        }
    ));
    assert_eq!(report.state.consecutive_failure_count, 1);
    assert_eq!(store.save_count(), 1, "A timed-out cycle is still persisted");
}
