// # Hostup DNS Provider
//
// This crate provides the Hostup DNS provider implementation for the hostup
// dynamic DNS client, plus the raw zone and record operations used by the
// command-line maintenance commands and the ACME DNS-01 hooks.
//
// ## Behaviour
//
// - One logical operation per call; nothing is retried here
// - Every failure is classified into a `ProviderError` variant so the
//   engine can apply retry policy
// - Dry-run mode performs all reads but only logs writes
// - Both A and AAAA records are supported
// - Zones come from configuration or are discovered from the hostname
//
// ## Security Requirements
//
// - The API key NEVER appears in logs or `Debug` output
// - Construction fails if the key is empty
//
// ## API Reference
//
// All paths are relative to the base URI (default `https://cloud.hostup.se/api/`)
// and authenticated with the `X-API-Key` header.
//
// - List zones: GET `dns/zones`
// - List records: GET `dns/zones/:zone_id/records`
// - Create record: POST `dns/zones/:zone_id/records`
// - Delete record: DELETE `dns/zones/:zone_id/records/:record_id`

pub mod lego;
pub mod models;

use async_trait::async_trait;
use hostup_core::config::{ApiKey, ClientConfig, ProviderConfig};
use hostup_core::record::{same_hostname, Record, RecordType};
use hostup_core::traits::ProviderClient;
use hostup_core::{Error, ProviderError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;

pub use models::{DnsRecord, NewRecord, Zone, ZoneRecords};

use models::{CreatedRecordData, DeletedRecordData, Envelope, ErrorBody, ZoneRecordsData, ZonesData};

/// Header carrying the API key
const API_KEY_HEADER: &str = "X-API-Key";

/// Hostup DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is isolated, stateless, and single-shot. Retries, backoff
/// and scheduling are owned by `ReconciliationEngine`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST and DELETE requests
/// - **NOT** modify any record
pub struct HostupProvider {
    /// ⚠️ NEVER log this value
    api_key: ApiKey,

    /// Always ends with `/` so relative paths join below it
    base_uri: Url,

    /// Zone ID (optional, discovered from the hostname when absent)
    zone_id: Option<String>,

    /// TTL for records created by `update_record`
    default_ttl: u32,

    client: reqwest::Client,

    dry_run: bool,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for HostupProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostupProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_uri", &self.base_uri.as_str())
            .field("zone_id", &self.zone_id)
            .field("default_ttl", &self.default_ttl)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl HostupProvider {
    /// Create a provider from its configuration
    ///
    /// `default_ttl` is used for every record the reconciliation path
    /// creates.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the key is empty, the base URI does not parse or
    /// the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig, default_ttl: u32) -> Result<Self, Error> {
        config.validate()?;

        let mut base = config.base_uri.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_uri = Url::parse(&base)
            .map_err(|e| Error::config(format!("Invalid base URI {}: {}", config.base_uri, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hostup-dns-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if config.dry_run {
            tracing::warn!("Hostup provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            base_uri,
            zone_id: config.zone_id.as_ref().map(|id| id.trim().to_string()),
            default_ttl,
            client,
            dry_run: config.dry_run,
        })
    }

    /// Create a provider for the record described by a full client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, Error> {
        Self::new(&config.provider, config.record.ttl)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// List every zone on the account
    pub async fn list_zones(&self) -> Result<Vec<Zone>, ProviderError> {
        let data: ZonesData = self.request(Method::GET, "dns/zones", None).await?;
        Ok(data.zones)
    }

    /// List a zone's records
    pub async fn list_records(&self, zone_id: &str) -> Result<ZoneRecords, ProviderError> {
        let path = format!("dns/zones/{}/records", zone_id);
        let data: ZoneRecordsData = self.request(Method::GET, &path, None).await?;
        Ok(data.zone)
    }

    /// Create a record
    ///
    /// In dry-run mode the request is logged and a placeholder record with
    /// id `dry-run` is returned.
    pub async fn add_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<DnsRecord, ProviderError> {
        let path = format!("dns/zones/{}/records", zone_id);
        let body = serde_json::to_value(record)
            .map_err(|e| ProviderError::InvalidRequest(format!("Unencodable record: {}", e)))?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                path,
                body
            );
            return Ok(DnsRecord {
                id: "dry-run".to_string(),
                record_type: record.record_type.clone(),
                name: record.name.clone(),
                value: record.value.clone(),
                ttl: Some(record.ttl),
                status: Some("dry-run".to_string()),
                created: None,
            });
        }

        let data: CreatedRecordData = self.request(Method::POST, &path, Some(body)).await?;
        tracing::info!(
            "Created {} record {} -> {} (id {})",
            data.record.record_type,
            data.record.name,
            data.record.value,
            data.record.id
        );
        Ok(data.record)
    }

    /// Delete a record by id
    ///
    /// Returns the confirmation message the API sent, if any.
    pub async fn delete_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let path = format!("dns/zones/{}/records/{}", zone_id, record_id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", path);
            return Ok(None);
        }

        let data: DeletedRecordData = self.request(Method::DELETE, &path, None).await?;
        tracing::info!("Deleted record {} from zone {}", record_id, zone_id);
        Ok(data.message)
    }

    /// Delete every record named `domain`, whatever its type
    ///
    /// Returns the deleted records. Finding nothing is not an error.
    pub async fn delete_domain(&self, domain: &str) -> Result<Vec<DnsRecord>, ProviderError> {
        let zone_id = self.zone_id_for(domain).await?;
        let zone = self.list_records(&zone_id).await?;

        let doomed: Vec<DnsRecord> = zone
            .records
            .into_iter()
            .filter(|r| same_hostname(&record_fqdn(&r.name, &zone.domain), domain))
            .collect();

        tracing::info!(
            "Deleting {} record(s) for {} in zone {} [mode: {}]",
            doomed.len(),
            domain,
            zone.domain,
            self.mode()
        );

        for record in &doomed {
            self.delete_record(&zone_id, &record.id).await?;
        }
        Ok(doomed)
    }

    /// Find the zone that owns `hostname`
    ///
    /// Picks the zone whose domain is the longest suffix of the hostname, so
    /// `a.b.example.org` prefers a `b.example.org` zone over `example.org`.
    pub async fn find_zone(&self, hostname: &str) -> Result<Zone, ProviderError> {
        let zones = self.list_zones().await?;
        zones
            .into_iter()
            .filter(|zone| is_within(hostname, &zone.domain))
            .max_by_key(|zone| zone.domain.trim_end_matches('.').len())
            .ok_or_else(|| ProviderError::NotFound(format!("No zone found for {}", hostname)))
    }

    /// Zone id for `hostname`: configured, otherwise discovered
    async fn zone_id_for(&self, hostname: &str) -> Result<String, ProviderError> {
        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        let zone = self.find_zone(hostname).await?;
        tracing::debug!("Found zone {} (id {}) for {}", zone.domain, zone.domain_id, hostname);
        Ok(zone.domain_id)
    }

    /// Records of `zone` with the given name and type
    fn matching_records<'a>(
        zone: &'a ZoneRecords,
        hostname: &'a str,
        record_type: RecordType,
    ) -> impl Iterator<Item = &'a DnsRecord> + 'a {
        zone.records.iter().filter(move |r| {
            r.record_type.eq_ignore_ascii_case(record_type.as_str())
                && same_hostname(&record_fqdn(&r.name, &zone.domain), hostname)
        })
    }

    fn mode(&self) -> &'static str {
        if self.dry_run { "DRY-RUN" } else { "LIVE" }
    }

    /// Send one request and decode the `data` member of the response
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ProviderError> {
        let url = self
            .base_uri
            .join(path)
            .map_err(|e| ProviderError::InvalidRequest(format!("Invalid path {}: {}", path, e)))?;

        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(API_KEY_HEADER, self.api_key.expose())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &headers, &bytes));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
            ProviderError::InvalidRequest(format!(
                "Failed to parse response to {} {}: {}",
                method, path, e
            ))
        })?;

        if !envelope.success {
            return Err(ProviderError::InvalidRequest(format!(
                "API reported failure for {} {} (request {})",
                method,
                path,
                envelope.request_id.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl ProviderClient for HostupProvider {
    async fn fetch_current_record(
        &self,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Record, ProviderError> {
        let zone_id = self.zone_id_for(hostname).await?;
        let zone = self.list_records(&zone_id).await?;

        let found = Self::matching_records(&zone, hostname, record_type)
            .next()
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "DNS record not found: {} (type: {})",
                    hostname, record_type
                ))
            })?;

        to_record(hostname, &found.value, record_type)
    }

    /// Point `hostname` at `new_address`
    ///
    /// Hostup has no in-place update, so a changed address is written as a
    /// new record followed by deletion of the old ones. If a record with the
    /// address already exists nothing is created, and any leftover records of
    /// the same name and type are removed.
    async fn update_record(
        &self,
        hostname: &str,
        new_address: IpAddr,
        record_type: RecordType,
    ) -> Result<Record, ProviderError> {
        if !record_type.matches(&new_address) {
            return Err(ProviderError::InvalidRequest(format!(
                "{} is not a valid {} address",
                new_address, record_type
            )));
        }

        tracing::info!(
            "Updating Hostup DNS record: {} -> {} ({}) [mode: {}]",
            hostname,
            new_address,
            record_type,
            self.mode()
        );

        let zone_id = self.zone_id_for(hostname).await?;
        let zone = self.list_records(&zone_id).await?;
        let existing: Vec<&DnsRecord> =
            Self::matching_records(&zone, hostname, record_type).collect();

        let current = existing
            .iter()
            .find(|r| r.value.trim().parse::<IpAddr>().ok() == Some(new_address));

        let keep_id = match current {
            Some(record) => {
                tracing::info!(
                    "DNS record already has correct address: {} -> {}",
                    hostname,
                    new_address
                );
                record.id.clone()
            }
            None => {
                let name = hostname.trim_end_matches('.');
                let new_record = NewRecord::new(
                    record_type.as_str(),
                    name,
                    new_address.to_string(),
                    self.default_ttl,
                );
                self.add_record(&zone_id, &new_record).await?.id
            }
        };

        for stale in existing.iter().filter(|r| r.id != keep_id) {
            tracing::info!(
                "Removing stale {} record {} -> {} (id {})",
                record_type,
                stale.name,
                stale.value,
                stale.id
            );
            self.delete_record(&zone_id, &stale.id).await?;
        }

        to_record(hostname, &new_address.to_string(), record_type)
    }

    fn provider_name(&self) -> &'static str {
        "hostup"
    }
}

/// Map a non-2xx response to a provider error
fn classify_status(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ProviderError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.summary())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailure(format!(
            "Invalid API key or insufficient permissions. Status: {} - {}",
            status, detail
        )),
        404 => ProviderError::NotFound(format!("Status: {} - {}", status, detail)),
        429 => ProviderError::RateLimited {
            retry_after: retry_after(headers),
        },
        500..=599 => {
            ProviderError::Transient(format!("Hostup server error: {} - {}", status, detail))
        }
        _ => ProviderError::InvalidRequest(format!("Request rejected: {} - {}", status, detail)),
    }
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("HTTP request timed out: {}", err))
    } else {
        ProviderError::Transient(format!("HTTP request failed: {}", err))
    }
}

fn to_record(hostname: &str, value: &str, record_type: RecordType) -> Result<Record, ProviderError> {
    Record::parse(hostname, value.trim(), record_type).map_err(|e| {
        ProviderError::InvalidRequest(format!("Unusable record value {:?}: {}", value, e))
    })
}

/// Fully-qualified name of a record
///
/// The API reports names as FQDNs, but `@` and relative names are accepted
/// as well.
fn record_fqdn(name: &str, zone_domain: &str) -> String {
    let name = name.trim().trim_end_matches('.');
    let zone = zone_domain.trim().trim_end_matches('.');
    if name.is_empty() || name == "@" {
        zone.to_string()
    } else if is_within(name, zone) {
        name.to_string()
    } else {
        format!("{}.{}", name, zone)
    }
}

/// Whether `hostname` equals `domain` or lies below it
fn is_within(hostname: &str, domain: &str) -> bool {
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    hostname == domain || hostname.ends_with(&format!(".{}", domain))
}
