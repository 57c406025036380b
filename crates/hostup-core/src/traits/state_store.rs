// # State Store Trait
//
// Defines the interface for persisting reconciliation state between runs.
//
// ## Purpose
//
// The state store lets a restarted client know:
// - The record it last applied
// - When it last attempted and last succeeded
// - How many cycles in a row have failed
//
// Without it every restart would push an update to the provider.
//
// ## Implementations
//
// - File-based: JSON document with atomic replace (`FileStateStore`)
// - In-memory: tests and ephemeral deployments (`MemoryStateStore`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::Record;

/// Reconciliation state carried across cycles and restarts
///
/// Owned by the `ReconciliationEngine`; nothing else mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationState {
    /// The record most recently confirmed at the provider
    #[serde(default)]
    pub last_applied_address: Option<Record>,

    /// When the last cycle finished, whatever its outcome
    #[serde(default)]
    pub last_attempt_timestamp: Option<DateTime<Utc>>,

    /// When the provider last accepted an update
    #[serde(default)]
    pub last_success_timestamp: Option<DateTime<Utc>>,

    /// Cycles failed in a row; reset by any successful or no-op cycle
    #[serde(default)]
    pub consecutive_failure_count: u32,
}

impl ReconciliationState {
    /// Whether the last success is older than `max_age` (or never happened)
    pub fn is_stale(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.last_success_timestamp {
            Some(at) => now.signed_duration_since(at) > max_age,
            None => true,
        }
    }
}

/// Trait for state store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Keep a backup of the last good document
///
/// ## Forbidden Capabilities
/// - ❌ Interpret the state (owned by `ReconciliationEngine`)
/// - ❌ Spawn background flush tasks
///
/// ## Implementation Guidelines
///
/// - `save` is all-or-nothing: a crash mid-write must never leave a torn
///   document for the next `load`
/// - `load` of a store that was never written returns the default state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted state
    ///
    /// # Returns
    ///
    /// - `Ok(ReconciliationState)`: Stored state, or default if none exists
    /// - `Err(StorageError)`: Storage could not be read
    async fn load(&self) -> Result<ReconciliationState, StorageError>;

    /// Atomically replace the persisted state
    ///
    /// # Returns
    ///
    /// - `Ok(())`: State durably written
    /// - `Err(StorageError)`: Write failed; the previous document is intact
    async fn save(&self, state: &ReconciliationState) -> Result<(), StorageError>;
}
