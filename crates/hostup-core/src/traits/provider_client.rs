// # Provider Client Trait
//
// Defines the interface for reading and writing a DNS record through a
// provider's API.
//
// ## Implementations
//
// - Hostup: `hostup-provider` crate
//
// ## Usage
//
// ```rust,ignore
// use hostup_core::{ProviderClient, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* ProviderClient implementation */;
//
//     let record = provider
//         .update_record("home.example.org", "1.2.3.4".parse()?, RecordType::A)
//         .await?;
//     println!("applied {}", record);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::ProviderError;
use crate::record::{Record, RecordType};

/// Trait for DNS provider clients
///
/// # Trust Level: Untrusted
///
/// Providers are isolated integrations:
///
/// ## Allowed
/// - ✅ HTTP/HTTPS calls to their own API endpoints
/// - ✅ Parsing provider-specific payloads
/// - ✅ Classifying failures into [`ProviderError`] variants
///
/// ## Forbidden
/// - ❌ Retry loops, backoff or sleeping (owned by `ReconciliationEngine`)
/// - ❌ Touching the state store
/// - ❌ Deciding whether an update is needed
/// - ❌ Spawning tasks
///
/// A provider that retries internally hides rate-limit pressure from the
/// engine and breaks its per-cycle retry budget. Return the error instead.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Read the record currently published for `hostname`
    ///
    /// # Returns
    ///
    /// - `Ok(Record)`: The published record
    /// - `Err(ProviderError::NotFound)`: No record of that type exists
    async fn fetch_current_record(
        &self,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Record, ProviderError>;

    /// Point `hostname` at `new_address`
    ///
    /// Calling this twice with the same address must be safe. The engine
    /// does not rely on that and suppresses redundant calls itself.
    ///
    /// # Returns
    ///
    /// - `Ok(Record)`: The record as now published
    /// - `Err(ProviderError)`: Classified failure; the engine applies retry policy
    async fn update_record(
        &self,
        hostname: &str,
        new_address: IpAddr,
        record_type: RecordType,
    ) -> Result<Record, ProviderError>;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}
