//! Error types for the hostup client
//!
//! Errors are split by the component that raises them so the reconciliation
//! engine can decide retry policy from the type alone:
//!
//! - [`ResolutionError`]: public address lookup (always retryable)
//! - [`ProviderError`]: remote DNS API (retryable or fatal per variant)
//! - [`StorageError`]: state persistence
//!
//! [`Error`] is the umbrella type returned by configuration and construction
//! paths.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for hostup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to determine the current public address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The echo endpoint could not be reached or answered with an error status
    #[error("address endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered but the body did not hold a usable address
    #[error("malformed address response: {0}")]
    MalformedResponse(String),

    /// The lookup did not finish within its deadline
    #[error("address lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl ResolutionError {
    /// Every resolution failure may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Failure reported by the DNS provider API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials rejected (fatal)
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Provider asked us to slow down
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited {
        /// Backoff suggested by the provider, if it sent one
        retry_after: Option<Duration>,
    },

    /// Network failure, timeout or 5xx
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The request was rejected as malformed, or the response broke the API contract (fatal)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The zone or record does not exist (fatal)
    #[error("not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Whether the engine may retry the call within the same cycle
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }

    /// Backoff hint carried by a rate-limit response
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Failure to read or write persisted state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Filesystem failure
    #[error("state I/O failure: {0}")]
    Io(String),

    /// Stored document could not be decoded
    #[error("state document corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Address resolution errors
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// DNS provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// State store errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
