//! Command-line interface
//!
//! Every option can also be set through its `HOSTUP_*` environment variable,
//! so the daemon can run from a systemd unit or container without flags.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hostup_core::config::{
    ApiKey, ClientConfig, DEFAULT_BASE_URI, DEFAULT_ECHO_URL_V4, DEFAULT_ECHO_URL_V6,
    EngineConfig, ProviderConfig, RecordConfig, ResolverConfig, ScheduleConfig, StateStoreConfig,
};
use hostup_core::record::RecordType;
use hostup_provider::lego::LegoAction;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "hostupd", version)]
#[command(about = "Keep a Hostup DNS record pointed at this network's public address")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Hostup API key
    #[arg(
        long,
        short = 'k',
        env = "HOSTUP_DNS_CLIENT_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// File holding the API key (first non-empty line)
    #[arg(long, env = "HOSTUP_API_KEY_FILE", global = true)]
    pub api_key_file: Option<PathBuf>,

    /// Hostup API base URI
    #[arg(
        long,
        short = 'b',
        env = "HOSTUP_DNS_CLIENT_BASE_URI",
        default_value = DEFAULT_BASE_URI,
        global = true
    )]
    pub base_uri: String,

    /// Per-request timeout for API calls, in seconds
    #[arg(long, env = "HOSTUP_API_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub api_timeout_secs: u64,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "HOSTUP_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run as a daemon, reconciling on an interval until SIGTERM/SIGINT
    Run(ReconcileArgs),

    /// Run a single reconciliation cycle and exit
    Once(ReconcileArgs),

    /// Show the published record next to the locally persisted state
    Status(ReconcileArgs),

    /// List the zones on the account
    Zones,

    /// List the records of a zone
    Records {
        zone_id: String,
    },

    /// Add a record to a zone
    Add {
        zone_id: String,
        /// Record type (A, AAAA, CNAME, TXT, ...)
        record_type: String,
        /// Fully-qualified record name
        name: String,
        value: String,
        ttl: u32,
    },

    /// Delete a record by id
    Delete {
        zone_id: String,
        record_id: String,
    },

    /// Delete ALL records, of every type, for the given name
    DeleteDomain {
        domain: String,
    },

    /// DNS-01 hook for lego's exec provider
    Lego {
        /// present or cleanup
        action: LegoAction,
        /// Challenge FQDN, e.g. _acme-challenge.example.org.
        domain: String,
        /// Challenge TXT value
        value: String,
    },
}

/// Options shared by the reconciling commands
#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    /// Hostname to keep up to date
    #[arg(long, env = "HOSTUP_HOSTNAME")]
    pub hostname: String,

    /// Record type: A or AAAA
    #[arg(long = "type", env = "HOSTUP_RECORD_TYPE", default_value = "A")]
    pub record_type: RecordType,

    /// Zone id; discovered from the hostname when omitted
    #[arg(long, env = "HOSTUP_ZONE_ID")]
    pub zone_id: Option<String>,

    /// TTL for records the client creates
    #[arg(long, env = "HOSTUP_TTL", default_value_t = 3600)]
    pub ttl: u32,

    /// Seconds between cycles in daemon mode
    #[arg(long, env = "HOSTUP_INTERVAL_SECS", default_value_t = 300)]
    pub interval_secs: u64,

    /// Re-push an unchanged address after this many seconds (0 disables)
    #[arg(long, env = "HOSTUP_REFRESH_SECS", default_value_t = 86_400)]
    pub refresh_secs: u64,

    /// State file; state is kept in memory only when omitted
    #[arg(long, env = "HOSTUP_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// Echo endpoint for IPv4 lookups
    #[arg(long, env = "HOSTUP_ECHO_URL_V4", default_value = DEFAULT_ECHO_URL_V4)]
    pub echo_url_v4: String,

    /// Echo endpoint for IPv6 lookups
    #[arg(long, env = "HOSTUP_ECHO_URL_V6", default_value = DEFAULT_ECHO_URL_V6)]
    pub echo_url_v6: String,

    /// Echo request timeout in seconds
    #[arg(long, env = "HOSTUP_ECHO_TIMEOUT_SECS", default_value_t = 10)]
    pub echo_timeout_secs: u64,

    /// Retries per cycle after the first attempt
    #[arg(long, env = "HOSTUP_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// First retry delay in milliseconds
    #[arg(long, env = "HOSTUP_INITIAL_BACKOFF_MS", default_value_t = 1_000)]
    pub initial_backoff_ms: u64,

    /// Longest retry delay in milliseconds
    #[arg(long, env = "HOSTUP_MAX_BACKOFF_MS", default_value_t = 60_000)]
    pub max_backoff_ms: u64,

    /// Random jitter added to each delay, in milliseconds
    #[arg(long, env = "HOSTUP_JITTER_MS", default_value_t = 500)]
    pub jitter_ms: u64,

    /// Timeout for a single resolver or provider call, in seconds
    #[arg(long, env = "HOSTUP_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Deadline for a whole cycle including retries, in seconds
    #[arg(long, env = "HOSTUP_CYCLE_TIMEOUT_SECS", default_value_t = 240)]
    pub cycle_timeout_secs: u64,

    /// Read from the API but only log writes
    #[arg(long, env = "HOSTUP_DRY_RUN")]
    pub dry_run: bool,
}

impl GlobalArgs {
    /// The API key from the flag, the environment or the key file
    pub fn api_key(&self) -> Result<ApiKey> {
        let key = match (&self.api_key, &self.api_key_file) {
            (Some(key), _) => ApiKey::new(key.as_str()),
            (None, Some(path)) => ApiKey::from_file(path)
                .with_context(|| format!("Failed to read API key from {}", path.display()))?,
            (None, None) => anyhow::bail!(
                "An API key is required. \
                Set it via --api-key, --api-key-file or HOSTUP_DNS_CLIENT_API_KEY"
            ),
        };

        if key.is_empty() {
            anyhow::bail!("The API key is empty");
        }
        Ok(key)
    }

    /// Provider settings for the maintenance commands
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let mut config = ProviderConfig::new(self.api_key()?);
        config.base_uri = self.base_uri.clone();
        config.timeout_secs = self.api_timeout_secs;
        config.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "Log level '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

impl ReconcileArgs {
    /// Build and validate the client configuration
    pub fn client_config(&self, global: &GlobalArgs) -> Result<ClientConfig> {
        validate_domain_name(&self.hostname)?;

        if let Some(zone_id) = &self.zone_id
            && zone_id.trim().is_empty()
        {
            anyhow::bail!("--zone-id cannot be empty");
        }

        if !(10..=86_400).contains(&self.interval_secs) {
            anyhow::bail!(
                "HOSTUP_INTERVAL_SECS must be between 10 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.max_retries > 20 {
            anyhow::bail!(
                "HOSTUP_MAX_RETRIES must be at most 20. Got: {}",
                self.max_retries
            );
        }

        if let Some(path) = &self.state_path
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "HOSTUP_STATE_PATH parent directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        let record = RecordConfig::new(self.hostname.trim_end_matches('.'))
            .with_record_type(self.record_type)
            .with_ttl(self.ttl);

        let mut provider = global.provider_config()?;
        provider.zone_id = self.zone_id.clone();
        provider.dry_run = self.dry_run;

        let config = ClientConfig {
            record,
            provider,
            resolver: ResolverConfig {
                url_v4: self.echo_url_v4.clone(),
                url_v6: self.echo_url_v6.clone(),
                timeout_secs: self.echo_timeout_secs,
            },
            state_store: match &self.state_path {
                Some(path) => StateStoreConfig::File { path: path.clone() },
                None => StateStoreConfig::Memory,
            },
            engine: EngineConfig {
                max_retries: self.max_retries,
                initial_backoff_ms: self.initial_backoff_ms,
                max_backoff_ms: self.max_backoff_ms,
                jitter_ms: self.jitter_ms,
                call_timeout_secs: self.call_timeout_secs,
                cycle_timeout_secs: self.cycle_timeout_secs,
                refresh_interval_secs: (self.refresh_secs > 0).then_some(self.refresh_secs),
                ..EngineConfig::default()
            },
            schedule: ScheduleConfig {
                interval_secs: self.interval_secs,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; underscores are allowed for service and
/// challenge labels. A single trailing root dot is accepted.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    if !domain.contains('.') {
        anyhow::bail!("Domain name must be fully qualified. Got: '{}'", domain);
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}
