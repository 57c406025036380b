//! ACME DNS-01 hooks for lego's `exec` provider
//!
//! lego runs the configured program as `<program> present <fqdn> <value>`
//! before validation and `<program> cleanup <fqdn> <value>` afterwards.
//! `present` publishes the challenge as a TXT record; `cleanup` removes it.

use hostup_core::ProviderError;
use hostup_core::record::same_hostname;
use std::fmt;
use std::str::FromStr;

use crate::models::{DnsRecord, NewRecord};
use crate::{HostupProvider, record_fqdn};

/// TTL used for challenge records
pub const CHALLENGE_TTL: u32 = 300;

/// Hook action requested by lego
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegoAction {
    Present,
    Cleanup,
}

impl FromStr for LegoAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "cleanup" => Ok(Self::Cleanup),
            other => Err(format!(
                "Unknown lego action '{}' (expected present or cleanup)",
                other
            )),
        }
    }
}

impl fmt::Display for LegoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Cleanup => "cleanup",
        })
    }
}

impl HostupProvider {
    /// Run a lego hook
    ///
    /// Returns the record that was created or deleted.
    pub async fn lego(
        &self,
        action: LegoAction,
        fqdn: &str,
        value: &str,
    ) -> Result<DnsRecord, ProviderError> {
        match action {
            LegoAction::Present => self.lego_present(fqdn, value).await,
            LegoAction::Cleanup => self.lego_cleanup(fqdn, value).await,
        }
    }

    /// Publish a challenge TXT record
    pub async fn lego_present(&self, fqdn: &str, value: &str) -> Result<DnsRecord, ProviderError> {
        let zone_id = self.zone_id_for(fqdn).await?;
        let record = NewRecord::new("TXT", fqdn.trim_end_matches('.'), value, CHALLENGE_TTL);
        tracing::info!("Adding challenge TXT record for {} in zone {}", fqdn, zone_id);
        self.add_record(&zone_id, &record).await
    }

    /// Remove a challenge TXT record
    ///
    /// Prefers the TXT record whose value matches, so concurrent challenges
    /// for the same name (wildcard plus apex) do not remove each other's
    /// record. Falls back to the first TXT record with the name.
    pub async fn lego_cleanup(&self, fqdn: &str, value: &str) -> Result<DnsRecord, ProviderError> {
        let zone_id = self.zone_id_for(fqdn).await?;
        let records = self.list_records(&zone_id).await?;

        let candidates: Vec<&DnsRecord> = records
            .records
            .iter()
            .filter(|r| {
                r.record_type.eq_ignore_ascii_case("TXT")
                    && same_hostname(&record_fqdn(&r.name, &records.domain), fqdn)
            })
            .collect();

        let target = candidates
            .iter()
            .find(|r| r.unquoted_value() == value)
            .or_else(|| candidates.first())
            .map(|r| (*r).clone())
            .ok_or_else(|| {
                ProviderError::NotFound(format!("Could not find TXT record for {}", fqdn))
            })?;

        tracing::info!("Removing challenge TXT record {} (id {})", target.name, target.id);
        self.delete_record(&zone_id, &target.id).await?;
        Ok(target)
    }
}
