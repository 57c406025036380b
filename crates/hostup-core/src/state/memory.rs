// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple, fast state store that doesn't persist across restarts.
// Useful for testing and for deployments where a restart may safely push
// the current address once more.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - First cycle after a restart treats the address as new and updates DNS

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::state_store::{ReconciliationState, StateStore};

/// In-memory state store implementation
///
/// Clones share the same underlying state, so a test can keep a handle and
/// inspect what the engine saved.
///
/// # Example
///
/// ```rust,no_run
/// use hostup_core::state::MemoryStateStore;
/// use hostup_core::traits::{ReconciliationState, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     let mut state = ReconciliationState::default();
///     state.consecutive_failure_count = 1;
///     store.save(&state).await?;
///
///     assert_eq!(store.load().await?, state);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Option<ReconciliationState>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `state`
    pub fn with_state(state: ReconciliationState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(state))),
        }
    }

    /// Whether anything has been saved yet
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Drop the stored state
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<ReconciliationState, StorageError> {
        Ok(self.inner.read().await.clone().unwrap_or_default())
    }

    async fn save(&self, state: &ReconciliationState) -> Result<(), StorageError> {
        *self.inner.write().await = Some(state.clone());
        Ok(())
    }
}
