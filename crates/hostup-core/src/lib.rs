// # hostup-core
//
// Core library for the hostup dynamic DNS client.
//
// ## Architecture Overview
//
// This library keeps one DNS record pointed at the caller's public address:
// - **AddressResolver**: Trait for discovering the current public address
// - **ProviderClient**: Trait for reading and writing the record via the provider API
// - **StateStore**: Trait for persisting reconciliation state across restarts
// - **ReconciliationEngine**: Runs one resolve → compare → update → persist cycle
// - **Scheduler**: Drives cycles on an interval and on manual triggers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Engine-Owned Policy**: Retries, backoff and change detection live in the engine only
// 3. **Idempotency**: Redundant provider writes are suppressed from persisted state
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    ApiKey, ClientConfig, EngineConfig, ProviderConfig, RecordConfig, ResolverConfig,
    ScheduleConfig, StateStoreConfig,
};
pub use engine::{CycleReport, EngineEvent, FailureKind, ReconciliationEngine, UpdateOutcome};
pub use error::{Error, ProviderError, ResolutionError, Result, StorageError};
pub use record::{Record, RecordType};
pub use scheduler::{Scheduler, TriggerHandle};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{AddressResolver, ProviderClient, ReconciliationState, StateStore};
