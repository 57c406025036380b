//! Reconciliation engine
//!
//! The ReconciliationEngine is responsible for:
//! - Resolving the current public address via AddressResolver
//! - Comparing it with the last applied record
//! - Updating the DNS record via ProviderClient when it differs
//! - Persisting the reconciliation state after every cycle
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────┐
//!                   │  Scheduler   │
//!                   └──────────────┘
//!                          │ run_cycle()
//!                          ▼
//!                ┌──────────────────────┐
//!                │ ReconciliationEngine │
//!                └──────────────────────┘
//!                          │
//!     ┌────────────────────┼────────────────────┬───────────────────┐
//!     │                    │                    │                   │
//!     ▼                    ▼                    ▼                   ▼
//! ┌──────────────┐  ┌──────────────┐   ┌──────────────┐    ┌─────────────┐
//! │AddressResolv.│  │ProviderClient│   │  StateStore  │    │   Events    │
//! │  (resolve)   │  │  (update)    │   │  (persist)   │    │  (notify)   │
//! └──────────────┘  └──────────────┘   └──────────────┘    └─────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Load state (in-memory copy, or the store on first use)
//! 2. Resolve the current address
//! 3. Compare with the last applied record; stop if equal and fresh
//! 4. Otherwise call ProviderClient::update_record(), retrying transient
//!    failures with backoff and re-resolving before each retry
//! 5. Persist the new state, whatever the outcome
//! 6. Emit events for monitoring/logging

mod backoff;

pub use backoff::BackoffPolicy;

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, RecordConfig};
use crate::error::{ProviderError, ResolutionError, Result, StorageError};
use crate::record::{Record, RecordType};
use crate::shutdown::Shutdown;
use crate::traits::{AddressResolver, ProviderClient, ReconciliationState, StateStore};

/// Events emitted by the ReconciliationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A cycle began
    CycleStarted { hostname: String },

    /// The resolver produced an address
    AddressResolved { hostname: String, address: IpAddr },

    /// DNS update skipped (no change needed)
    UpdateSkipped {
        hostname: String,
        current_address: IpAddr,
    },

    /// Address unchanged but the last success is too old; re-pushing it
    ForcedRefresh {
        hostname: String,
        address: IpAddr,
        last_success: Option<DateTime<Utc>>,
    },

    /// DNS update started
    UpdateStarted {
        hostname: String,
        new_address: IpAddr,
        previous_address: Option<IpAddr>,
    },

    /// A retryable failure; the next attempt follows after `delay`
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        error: String,
    },

    /// DNS update succeeded
    UpdateSucceeded {
        hostname: String,
        new_address: IpAddr,
        previous_address: Option<IpAddr>,
    },

    /// The cycle ended in failure
    UpdateFailed {
        hostname: String,
        error: String,
        retryable: bool,
        consecutive_failures: u32,
    },

    /// A failure that needs a human (bad credentials, bad request, missing zone)
    OperatorAlert { hostname: String, error: String },

    /// State written to the store
    StatePersisted { consecutive_failures: u32 },

    /// State could not be written
    PersistFailed { error: String },

    /// A tick or trigger arrived while a cycle was running
    CycleSkipped { reason: String },

    /// Scheduler stopped
    Stopped { reason: String },
}

/// Why a cycle failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error(transparent)]
    Resolution(ResolutionError),

    #[error(transparent)]
    Provider(ProviderError),

    /// The cycle deadline passed before the cycle could finish
    #[error("cycle deadline exceeded")]
    CycleTimeout,

    /// Shutdown was requested while waiting to retry
    #[error("cycle cancelled by shutdown")]
    Cancelled,
}

/// Result of the decision part of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The applied record already matches the current address
    NoChangeNeeded,

    /// The provider accepted the record
    Updated(Record),

    /// The cycle failed; `retryable` failures are retried on the next tick
    Failed { kind: FailureKind, retryable: bool },
}

impl UpdateOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, UpdateOutcome::Failed { .. })
    }

    /// A failure retrying cannot fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, UpdateOutcome::Failed { retryable: false, .. })
    }

    fn failed(kind: FailureKind, retryable: bool) -> Self {
        UpdateOutcome::Failed { kind, retryable }
    }
}

/// Everything a caller needs to know about one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: UpdateOutcome,

    /// State as handed to the store at the end of the cycle
    pub state: ReconciliationState,

    /// Set when the final save failed; the in-memory state still advanced
    pub persist_error: Option<StorageError>,

    /// Number of `update_record` calls made
    pub attempts: u32,
}

/// What the comparison step decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Unchanged,
    Changed,
    ForcedRefresh,
}

/// Core reconciliation engine
///
/// Each call to [`ReconciliationEngine::run_cycle`] runs one full
/// resolve → compare → update → persist pass. Cycles on the same engine are
/// serialized; the scheduler additionally skips ticks while one is running.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationEngine::new()`], keep the event receiver
/// 2. Call [`ReconciliationEngine::run_cycle()`] directly, or hand the engine
///    to a [`crate::scheduler::Scheduler`]
///
/// ## State Ownership
///
/// The engine is the only writer of [`ReconciliationState`]. After the first
/// cycle its in-memory copy is authoritative; the store is written every
/// cycle but only read when no copy exists yet.
///
/// ## Load Resistance
///
/// - **No redundant writes**: the provider is only called when the address
///   differs from the applied record, or a refresh is due
/// - **Bounded retries**: at most `max_retries` per cycle with exponential backoff
/// - **Bounded event channel**: full channel drops events (logged), never blocks
pub struct ReconciliationEngine {
    resolver: Box<dyn AddressResolver>,
    provider: Box<dyn ProviderClient>,
    state_store: Box<dyn StateStore>,

    /// The record kept in sync
    record: RecordConfig,

    backoff: BackoffPolicy,
    max_retries: u32,
    call_timeout: Duration,
    cycle_timeout: Duration,
    refresh_interval: Option<Duration>,

    /// Last computed state; also serializes cycles
    state: Mutex<Option<ReconciliationState>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconciliationEngine {
    /// Create a new reconciliation engine
    ///
    /// # Parameters
    ///
    /// - `resolver`: Address resolver implementation
    /// - `provider`: DNS provider implementation
    /// - `state_store`: State store implementation
    /// - `config`: Client configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Box<dyn AddressResolver>,
        provider: Box<dyn ProviderClient>,
        state_store: Box<dyn StateStore>,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            resolver,
            provider,
            state_store,
            backoff: BackoffPolicy::from_config(&config.engine),
            max_retries: config.engine.max_retries,
            call_timeout: config.engine.call_timeout(),
            cycle_timeout: config.engine.cycle_timeout(),
            refresh_interval: config.engine.refresh_interval(),
            record: config.record,
            state: Mutex::new(None),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The record this engine maintains
    pub fn record(&self) -> &RecordConfig {
        &self.record
    }

    /// Current state as the engine sees it (loads from the store if needed)
    pub async fn current_state(&self) -> ReconciliationState {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_state().await);
        }
        guard.clone().unwrap_or_default()
    }

    /// Run one reconciliation cycle
    ///
    /// Never returns an error: every failure is folded into the report and
    /// the state is persisted before returning. `shutdown` aborts pending
    /// retries but lets an in-flight network call and the final save finish.
    pub async fn run_cycle(&self, shutdown: &Shutdown) -> CycleReport {
        let mut state_guard = self.state.lock().await;
        let mut state = match state_guard.take() {
            Some(state) => state,
            None => self.load_state().await,
        };

        let hostname = self.record.hostname.clone();
        info!(
            "Reconciling {} {} (previous failures: {})",
            self.record.record_type, hostname, state.consecutive_failure_count
        );
        self.emit_event(EngineEvent::CycleStarted {
            hostname: hostname.clone(),
        });

        let deadline = deadline_after(self.cycle_timeout);
        let mut attempts = 0u32;
        let outcome = match tokio::time::timeout_at(
            deadline,
            self.reconcile(&state, deadline, shutdown, &mut attempts),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Cycle for {} exceeded its {:?} deadline",
                    hostname, self.cycle_timeout
                );
                UpdateOutcome::failed(FailureKind::CycleTimeout, true)
            }
        };

        let previous_address = state.last_applied_address.as_ref().map(Record::address);
        Self::apply_outcome(&mut state, &outcome, Utc::now());

        match &outcome {
            UpdateOutcome::NoChangeNeeded => {}
            UpdateOutcome::Updated(record) => {
                info!("Updated {} -> {}", hostname, record.address());
                self.emit_event(EngineEvent::UpdateSucceeded {
                    hostname: hostname.clone(),
                    new_address: record.address(),
                    previous_address,
                });
            }
            UpdateOutcome::Failed { kind, retryable } => {
                if *retryable {
                    warn!(
                        "Cycle for {} failed, deferring to next tick: {} ({} in a row)",
                        hostname, kind, state.consecutive_failure_count
                    );
                } else {
                    error!(
                        "Cycle for {} failed: {} ({} in a row)",
                        hostname, kind, state.consecutive_failure_count
                    );
                }
                self.emit_event(EngineEvent::UpdateFailed {
                    hostname: hostname.clone(),
                    error: kind.to_string(),
                    retryable: *retryable,
                    consecutive_failures: state.consecutive_failure_count,
                });
            }
        }

        let persist_error = match self.state_store.save(&state).await {
            Ok(()) => {
                debug!("State persisted for {}", hostname);
                self.emit_event(EngineEvent::StatePersisted {
                    consecutive_failures: state.consecutive_failure_count,
                });
                None
            }
            Err(e) => {
                error!("Failed to persist state for {}: {}", hostname, e);
                self.emit_event(EngineEvent::PersistFailed {
                    error: e.to_string(),
                });
                Some(e)
            }
        };

        *state_guard = Some(state.clone());

        CycleReport {
            outcome,
            state,
            persist_error,
            attempts,
        }
    }

    /// Load state from the store, falling back to empty state
    async fn load_state(&self) -> ReconciliationState {
        match self.state_store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load state, starting from empty state: {}", e);
                ReconciliationState::default()
            }
        }
    }

    /// Fold a cycle outcome into the state
    fn apply_outcome(state: &mut ReconciliationState, outcome: &UpdateOutcome, now: DateTime<Utc>) {
        state.last_attempt_timestamp = Some(now);
        match outcome {
            UpdateOutcome::NoChangeNeeded => {
                state.consecutive_failure_count = 0;
            }
            UpdateOutcome::Updated(record) => {
                state.last_applied_address = Some(record.clone());
                state.last_success_timestamp = Some(now);
                state.consecutive_failure_count = 0;
            }
            UpdateOutcome::Failed { .. } => {
                state.consecutive_failure_count = state.consecutive_failure_count.saturating_add(1);
            }
        }
    }

    /// Resolve, compare and update, with retries
    ///
    /// Does not touch `state`; the caller applies the outcome.
    async fn reconcile(
        &self,
        state: &ReconciliationState,
        deadline: Instant,
        shutdown: &Shutdown,
        attempts: &mut u32,
    ) -> UpdateOutcome {
        let hostname = self.record.hostname.as_str();
        let record_type = self.record.record_type;
        let previous_address = state.last_applied_address.as_ref().map(Record::address);
        let mut retry = 0u32;

        loop {
            let address = match self.resolve(record_type).await {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        "Address resolution via {} failed: {}",
                        self.resolver.resolver_name(),
                        e
                    );
                    return UpdateOutcome::failed(
                        FailureKind::Resolution(e.clone()),
                        e.is_retryable(),
                    );
                }
            };
            debug!("Resolved {} address {}", record_type, address);
            self.emit_event(EngineEvent::AddressResolved {
                hostname: hostname.to_string(),
                address,
            });

            match self.decide(state, address) {
                Decision::Unchanged => {
                    debug!("{} already points to {}, skipping update", hostname, address);
                    self.emit_event(EngineEvent::UpdateSkipped {
                        hostname: hostname.to_string(),
                        current_address: address,
                    });
                    return UpdateOutcome::NoChangeNeeded;
                }
                Decision::ForcedRefresh => {
                    info!(
                        "{} unchanged at {} but last success is stale, refreshing",
                        hostname, address
                    );
                    self.emit_event(EngineEvent::ForcedRefresh {
                        hostname: hostname.to_string(),
                        address,
                        last_success: state.last_success_timestamp,
                    });
                }
                Decision::Changed => {
                    info!(
                        "Address for {} changed: {:?} -> {}",
                        hostname, previous_address, address
                    );
                }
            }

            self.emit_event(EngineEvent::UpdateStarted {
                hostname: hostname.to_string(),
                new_address: address,
                previous_address,
            });

            *attempts += 1;
            let err = match self.update(hostname, address, record_type).await {
                Ok(record) => return UpdateOutcome::Updated(record),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(
                    "Provider {} rejected update of {}: {}. Operator action required.",
                    self.provider.provider_name(),
                    hostname,
                    err
                );
                self.emit_event(EngineEvent::OperatorAlert {
                    hostname: hostname.to_string(),
                    error: err.to_string(),
                });
                return UpdateOutcome::failed(FailureKind::Provider(err), false);
            }

            if retry >= self.max_retries {
                warn!(
                    "Update of {} failed after {} retries: {}",
                    hostname, retry, err
                );
                return UpdateOutcome::failed(FailureKind::Provider(err), true);
            }

            let delay = self.backoff.delay(retry, err.retry_after());
            let fits = Instant::now()
                .checked_add(delay)
                .is_some_and(|resume| resume <= deadline);
            if !fits {
                warn!(
                    "Not retrying update of {}: backoff {:?} would pass the cycle deadline",
                    hostname, delay
                );
                return UpdateOutcome::failed(FailureKind::Provider(err), true);
            }

            retry += 1;
            warn!(
                "Update attempt {} for {} failed: {}. Retrying in {:?}",
                retry, hostname, err, delay
            );
            self.emit_event(EngineEvent::RetryScheduled {
                attempt: retry,
                delay,
                error: err.to_string(),
            });

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Shutdown requested, abandoning retries for {}", hostname);
                    return UpdateOutcome::failed(FailureKind::Cancelled, true);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Decide whether `address` needs to be pushed
    fn decide(&self, state: &ReconciliationState, address: IpAddr) -> Decision {
        let applied = match &state.last_applied_address {
            Some(applied) => applied,
            None => return Decision::Changed,
        };

        if !applied.points_to(&self.record.hostname, address, self.record.record_type) {
            return Decision::Changed;
        }

        let stale = self
            .refresh_interval
            .and_then(|interval| chrono::Duration::from_std(interval).ok())
            .is_some_and(|max_age| state.is_stale(max_age, Utc::now()));

        if stale {
            Decision::ForcedRefresh
        } else {
            Decision::Unchanged
        }
    }

    /// One resolver call under the per-call timeout
    async fn resolve(&self, record_type: RecordType) -> std::result::Result<IpAddr, ResolutionError> {
        let address = tokio::time::timeout(
            self.call_timeout,
            self.resolver.resolve_current_address(record_type),
        )
        .await
        .map_err(|_| ResolutionError::Timeout(self.call_timeout))??;

        if !record_type.matches(&address) {
            return Err(ResolutionError::MalformedResponse(format!(
                "resolver returned {} for a {} record",
                address, record_type
            )));
        }
        Ok(address)
    }

    /// One provider call under the per-call timeout
    async fn update(
        &self,
        hostname: &str,
        address: IpAddr,
        record_type: RecordType,
    ) -> std::result::Result<Record, ProviderError> {
        tokio::time::timeout(
            self.call_timeout,
            self.provider.update_record(hostname, address, record_type),
        )
        .await
        .map_err(|_| {
            ProviderError::Transient(format!(
                "update_record timed out after {:?}",
                self.call_timeout
            ))
        })?
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        // A full channel means the consumer is behind; drop rather than block the cycle
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            ),
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Roughly thirty years; used when a timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
