//! Test doubles and common utilities for engine contract tests
//!
//! The doubles are scripted: each call pops the next scripted result, and
//! falls back to a steady default once the script runs out. Counters live
//! behind `Arc`s so a test can keep a handle after boxing the double into
//! the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use hostup_core::config::{
    ApiKey, ClientConfig, EngineConfig, RecordConfig, ResolverConfig, ScheduleConfig,
    StateStoreConfig,
};
use hostup_core::engine::EngineEvent;
use hostup_core::error::{ProviderError, ResolutionError, StorageError};
use hostup_core::record::{Record, RecordType};
use hostup_core::traits::{AddressResolver, ProviderClient, ReconciliationState, StateStore};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const HOSTNAME: &str = "home.example.org";

pub fn ip(text: &str) -> IpAddr {
    text.parse().expect("valid test address")
}

pub fn record(address: &str) -> Record {
    Record::parse(HOSTNAME, address, RecordType::A).expect("valid test record")
}

/// Resolver returning scripted results, then a steady address
pub struct ScriptedResolver {
    script: Arc<Mutex<VecDeque<Result<IpAddr, ResolutionError>>>>,
    steady: Arc<Mutex<IpAddr>>,
    delay: Option<Duration>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    /// Always resolves to `address`
    pub fn always(address: IpAddr) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            steady: Arc::new(Mutex::new(address)),
            delay: None,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a result ahead of the steady address
    pub fn then(self, result: Result<IpAddr, ResolutionError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the steady address mid-test
    pub fn set_address(&self, address: IpAddr) {
        *self.steady.lock().unwrap() = address;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Create a new ScriptedResolver that shares script and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            script: Arc::clone(&other.script),
            steady: Arc::clone(&other.steady),
            delay: other.delay,
            call_count: Arc::clone(&other.call_count),
        }
    }
}

#[async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve_current_address(
        &self,
        _record_type: RecordType,
    ) -> Result<IpAddr, ResolutionError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(*self.steady.lock().unwrap()),
        }
    }

    fn resolver_name(&self) -> &'static str {
        "scripted"
    }
}

/// Provider returning scripted failures, then accepting every update
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<ProviderError>>>,
    /// Fail every call with this once the script is exhausted
    steady_failure: Arc<Mutex<Option<ProviderError>>>,
    delay: Option<Duration>,
    update_call_count: Arc<AtomicUsize>,
    fetch_call_count: Arc<AtomicUsize>,
    /// Addresses passed to update_record, in call order
    updates: Arc<Mutex<Vec<(String, IpAddr)>>>,
    published: Arc<Mutex<Option<Record>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            steady_failure: Arc::new(Mutex::new(None)),
            delay: None,
            update_call_count: Arc::new(AtomicUsize::new(0)),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
            updates: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue one failing update
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.script.lock().unwrap().push_back(error);
        self
    }

    /// Fail every update past the script
    pub fn always_fail(self, error: ProviderError) -> Self {
        *self.steady_failure.lock().unwrap() = Some(error);
        self
    }

    /// Sleep this long inside every update
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn update_call_count(&self) -> usize {
        self.update_call_count.load(Ordering::SeqCst)
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(String, IpAddr)> {
        self.updates.lock().unwrap().clone()
    }

    /// Create a new ScriptedProvider that shares script and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            script: Arc::clone(&other.script),
            steady_failure: Arc::clone(&other.steady_failure),
            delay: other.delay,
            update_call_count: Arc::clone(&other.update_call_count),
            fetch_call_count: Arc::clone(&other.fetch_call_count),
            updates: Arc::clone(&other.updates),
            published: Arc::clone(&other.published),
        }
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn fetch_current_record(
        &self,
        hostname: &str,
        _record_type: RecordType,
    ) -> Result<Record, ProviderError> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        self.published
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::NotFound(hostname.to_string()))
    }

    async fn update_record(
        &self,
        hostname: &str,
        new_address: IpAddr,
        record_type: RecordType,
    ) -> Result<Record, ProviderError> {
        self.update_call_count.fetch_add(1, Ordering::SeqCst);
        self.updates
            .lock()
            .unwrap()
            .push((hostname.to_string(), new_address));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        if let Some(error) = self.steady_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let record = Record::new(hostname, new_address, record_type)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        *self.published.lock().unwrap() = Some(record.clone());
        Ok(record)
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// StateStore that counts calls and can be told to fail
pub struct CountingStateStore {
    state: Arc<Mutex<Option<ReconciliationState>>>,
    load_count: Arc<AtomicUsize>,
    save_count: Arc<AtomicUsize>,
    fail_loads: Arc<AtomicBool>,
    fail_saves: Arc<AtomicBool>,
}

impl CountingStateStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
            load_count: Arc::new(AtomicUsize::new(0)),
            save_count: Arc::new(AtomicUsize::new(0)),
            fail_loads: Arc::new(AtomicBool::new(false)),
            fail_saves: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pre-populate the persisted state
    pub fn with_state(self, state: ReconciliationState) -> Self {
        *self.state.lock().unwrap() = Some(state);
        self
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Last successfully saved state
    pub fn saved(&self) -> Option<ReconciliationState> {
        self.state.lock().unwrap().clone()
    }

    /// Create a new CountingStateStore that shares state and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            state: Arc::clone(&other.state),
            load_count: Arc::clone(&other.load_count),
            save_count: Arc::clone(&other.save_count),
            fail_loads: Arc::clone(&other.fail_loads),
            fail_saves: Arc::clone(&other.fail_saves),
        }
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn load(&self) -> Result<ReconciliationState, StorageError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk unavailable".to_string()));
        }
        Ok(self.state.lock().unwrap().clone().unwrap_or_default())
    }

    async fn save(&self, state: &ReconciliationState) -> Result<(), StorageError> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".to_string()));
        }
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

/// Helper to create a minimal ClientConfig for testing
///
/// Jitter is off so backoff delays are exact; forced refresh is off.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        record: RecordConfig::new(HOSTNAME).with_record_type(RecordType::A),
        provider: hostup_core::config::ProviderConfig::new(ApiKey::new("test-key")),
        resolver: ResolverConfig::default(),
        state_store: StateStoreConfig::Memory,
        engine: EngineConfig {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            jitter_ms: 0,
            call_timeout_secs: 5,
            cycle_timeout_secs: 60,
            refresh_interval_secs: None,
            event_channel_capacity: 100,
        },
        schedule: ScheduleConfig { interval_secs: 60 },
    }
}

/// Everything currently buffered in the event channel
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Receive until an event matches `pred`, returning everything seen
pub async fn recv_until(
    rx: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&EngineEvent) -> bool,
) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = pred(&event);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

/// Delays carried by RetryScheduled events
pub fn retry_delays(events: &[EngineEvent]) -> Vec<Duration> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::RetryScheduled { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect()
}

/// Build an engine around doubles the test keeps handles to
pub fn build_engine(
    resolver: &ScriptedResolver,
    provider: &ScriptedProvider,
    store: &CountingStateStore,
    config: ClientConfig,
) -> (
    hostup_core::engine::ReconciliationEngine,
    mpsc::Receiver<EngineEvent>,
) {
    hostup_core::engine::ReconciliationEngine::new(
        Box::new(ScriptedResolver::sharing_counters_with(resolver)),
        Box::new(ScriptedProvider::sharing_counters_with(provider)),
        Box::new(CountingStateStore::sharing_counters_with(store)),
        config,
    )
    .expect("engine construction succeeds")
}
