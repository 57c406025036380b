//! Core traits for the hostup client
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressResolver`]: Discover the current public address
//! - [`ProviderClient`]: Read and write the DNS record via the provider API
//! - [`StateStore`]: Persist reconciliation state across restarts

pub mod address_resolver;
pub mod provider_client;
pub mod state_store;

pub use address_resolver::AddressResolver;
pub use provider_client::ProviderClient;
pub use state_store::{ReconciliationState, StateStore};
