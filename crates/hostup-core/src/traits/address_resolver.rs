// # Address Resolver Trait
//
// Defines the interface for discovering the caller's public address.
//
// ## Implementations
//
// - Address-echo over HTTP: `hostup-resolver-http` crate
//
// ## Usage
//
// ```rust,ignore
// use hostup_core::{AddressResolver, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* AddressResolver implementation */;
//
//     let address = resolver.resolve_current_address(RecordType::A).await?;
//     println!("public address: {}", address);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::ResolutionError;
use crate::record::RecordType;

/// Trait for public address resolvers
///
/// Resolvers are stateless observers: one call, one lookup. They hold no
/// cache, never retry and never decide whether DNS should change; the
/// `ReconciliationEngine` owns all of that.
///
/// # Thread Safety
///
/// Implementations must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the current public address for the given family
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: An address whose family matches `record_type`
    /// - `Err(ResolutionError)`: Lookup failed; always retryable by the caller
    async fn resolve_current_address(
        &self,
        record_type: RecordType,
    ) -> Result<IpAddr, ResolutionError>;

    /// Name used in logs
    fn resolver_name(&self) -> &'static str {
        "resolver"
    }
}
