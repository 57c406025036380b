//! Configuration types for the hostup client
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::record::RecordType;

/// Default Hostup API base URI
pub const DEFAULT_BASE_URI: &str = "https://cloud.hostup.se/api/";

/// Default IPv4 address-echo endpoint
pub const DEFAULT_ECHO_URL_V4: &str = "https://api.ipify.org";

/// Default IPv6 address-echo endpoint
pub const DEFAULT_ECHO_URL_V6: &str = "https://api6.ipify.org";

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The record kept in sync
    pub record: RecordConfig,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Address resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Optional scheduling settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the record and key
    pub fn new(record: RecordConfig, api_key: ApiKey) -> Self {
        Self {
            record,
            provider: ProviderConfig::new(api_key),
            resolver: ResolverConfig::default(),
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.record.validate()?;
        self.provider.validate()?;
        self.resolver.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

/// DNS record configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Fully-qualified hostname (e.g., "home.example.org")
    pub hostname: String,

    /// Record type to maintain
    #[serde(default = "default_record_type")]
    pub record_type: RecordType,

    /// TTL for records the client creates
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            record_type: default_record_type(),
            ttl: default_ttl(),
        }
    }

    /// Set the record type
    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hostname.trim().is_empty() {
            return Err(crate::Error::config("Record hostname cannot be empty"));
        }
        if self.ttl == 0 {
            return Err(crate::Error::config("Record TTL must be > 0"));
        }
        Ok(())
    }
}

fn default_record_type() -> RecordType {
    RecordType::A
}

fn default_ttl() -> u32 {
    3600
}

/// API key that never prints its value
///
/// Serializing writes a placeholder, so a dumped config never carries the key.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// Read a key from a credentials file (first non-empty line)
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!(
                "Failed to read API key file {}: {}",
                path.display(),
                e
            ))
        })?;
        let key = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                crate::Error::config(format!("API key file {} is empty", path.display()))
            })?;
        Ok(Self::new(key))
    }

    /// The raw key, for the request header only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Hostup API key
    pub api_key: ApiKey,

    /// API base URI
    #[serde(default = "default_base_uri")]
    pub base_uri: String,

    /// Zone ID (optional, discovered from the hostname when absent)
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Log writes instead of performing them
    #[serde(default)]
    pub dry_run: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_uri: default_base_uri(),
            zone_id: None,
            dry_run: false,
            timeout_secs: default_provider_timeout_secs(),
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_key.is_empty() {
            return Err(crate::Error::config("Hostup API key cannot be empty"));
        }
        if !(self.base_uri.starts_with("http://") || self.base_uri.starts_with("https://")) {
            return Err(crate::Error::config(format!(
                "Base URI must be http(s): {}",
                self.base_uri
            )));
        }
        if matches!(&self.zone_id, Some(id) if id.trim().is_empty()) {
            return Err(crate::Error::config("Zone ID cannot be empty when set"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Provider timeout must be > 0"));
        }
        Ok(())
    }
}

fn default_base_uri() -> String {
    DEFAULT_BASE_URI.to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// Address resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Echo endpoint for IPv4 lookups
    #[serde(default = "default_echo_url_v4")]
    pub url_v4: String,

    /// Echo endpoint for IPv6 lookups
    #[serde(default = "default_echo_url_v6")]
    pub url_v6: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        for url in [&self.url_v4, &self.url_v6] {
            if url.is_empty() {
                return Err(crate::Error::config("Echo URL cannot be empty"));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(crate::Error::config(format!(
                    "Echo URL must be http(s): {}",
                    url
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Resolver timeout must be > 0"));
        }
        Ok(())
    }

    /// Echo URL for the given family
    pub fn url_for(&self, record_type: RecordType) -> &str {
        match record_type {
            RecordType::A => &self.url_v4,
            RecordType::Aaaa => &self.url_v6,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url_v4: default_echo_url_v4(),
            url_v6: default_echo_url_v6(),
            timeout_secs: default_resolver_timeout_secs(),
        }
    }
}

fn default_echo_url_v4() -> String {
    DEFAULT_ECHO_URL_V4.to_string()
}

fn default_echo_url_v6() -> String {
    DEFAULT_ECHO_URL_V6.to_string()
}

fn default_resolver_timeout_secs() -> u64 {
    10
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: PathBuf,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.as_os_str().is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of retries per cycle after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry (in milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound of the uniform jitter added to each backoff (in milliseconds)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Timeout for a single resolver or provider call (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Deadline for a whole cycle, retries and backoff included (in seconds)
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Re-push an unchanged address when the last success is older than this
    ///
    /// `None` disables forced refresh.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: Option<u64>,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    /// The engine never blocks on a slow consumer.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

/// Longest accepted cycle deadline (one day)
pub const MAX_CYCLE_TIMEOUT_SECS: u64 = 86_400;

/// Longest accepted single backoff (one hour)
pub const MAX_BACKOFF_MS: u64 = 3_600_000;

/// Largest accepted jitter (one minute)
pub const MAX_JITTER_MS: u64 = 60_000;

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.initial_backoff_ms == 0 {
            return Err(crate::Error::config("Initial backoff must be > 0"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(crate::Error::config(
                "Max backoff must be >= initial backoff",
            ));
        }
        if self.max_backoff_ms > MAX_BACKOFF_MS {
            return Err(crate::Error::config(format!(
                "Max backoff must be <= {} ms",
                MAX_BACKOFF_MS
            )));
        }
        if self.jitter_ms > MAX_JITTER_MS {
            return Err(crate::Error::config(format!(
                "Jitter must be <= {} ms",
                MAX_JITTER_MS
            )));
        }
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("Call timeout must be > 0"));
        }
        if self.cycle_timeout_secs < self.call_timeout_secs {
            return Err(crate::Error::config(
                "Cycle timeout must be >= call timeout",
            ));
        }
        if self.cycle_timeout_secs > MAX_CYCLE_TIMEOUT_SECS {
            return Err(crate::Error::config(format!(
                "Cycle timeout must be <= {} seconds",
                MAX_CYCLE_TIMEOUT_SECS
            )));
        }
        if self.refresh_interval_secs == Some(0) {
            return Err(crate::Error::config(
                "Refresh interval must be > 0 (omit it to disable forced refresh)",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_ms: default_jitter_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_cycle_timeout_secs() -> u64 {
    240
}

fn default_refresh_interval_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between reconciliation cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Schedule interval must be > 0"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}
