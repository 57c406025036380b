// # HTTP Address Resolver
//
// This crate provides an address-echo based resolver for the hostup client.
//
// ## Purpose
//
// Behind NAT the router, not this host, owns the public address, so the
// only reliable way to learn it is to ask a server on the internet which
// address the request came from.
//
// ## Architecture
//
// One echo URL per address family. Each lookup is a single GET on the URL
// for the requested family; nothing is cached and nothing is retried. The
// engine calls the resolver once per attempt.
//
// Accepted response bodies:
// - Plain text: `203.0.113.7`
// - JSON: `{"ip": "203.0.113.7"}` or `{"address": "203.0.113.7"}`

use async_trait::async_trait;
use hostup_core::config::ResolverConfig;
use hostup_core::error::ResolutionError;
use hostup_core::record::RecordType;
use hostup_core::traits::AddressResolver;
use hostup_core::{Error, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// JSON shape returned by echo services that do not answer in plain text
#[derive(Debug, Deserialize)]
struct EchoBody {
    #[serde(alias = "address")]
    ip: String,
}

/// HTTP address-echo resolver
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    url_v4: String,
    url_v6: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpAddressResolver {
    /// Create a resolver from its configuration
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hostup-dns-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url_v4: config.url_for(RecordType::A).to_string(),
            url_v6: config.url_for(RecordType::Aaaa).to_string(),
            timeout,
            client,
        })
    }

    fn url_for(&self, record_type: RecordType) -> &str {
        match record_type {
            RecordType::A => &self.url_v4,
            RecordType::Aaaa => &self.url_v6,
        }
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> ResolutionError {
        if err.is_timeout() {
            ResolutionError::Timeout(self.timeout)
        } else {
            ResolutionError::Unreachable(format!("{}: {}", url, err))
        }
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve_current_address(
        &self,
        record_type: RecordType,
    ) -> std::result::Result<IpAddr, ResolutionError> {
        let url = self.url_for(record_type);
        tracing::debug!("Resolving public {} address via {}", record_type, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if !response.status().is_success() {
            return Err(ResolutionError::Unreachable(format!(
                "{} answered with HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let address = parse_body(&body)?;
        if !record_type.matches(&address) {
            return Err(ResolutionError::MalformedResponse(format!(
                "expected an {} address from {}, got {}",
                record_type, url, address
            )));
        }

        tracing::debug!("Public {} address is {}", record_type, address);
        Ok(address)
    }

    fn resolver_name(&self) -> &'static str {
        "http"
    }
}

/// Extract an address from a plain-text or JSON echo body
fn parse_body(body: &str) -> std::result::Result<IpAddr, ResolutionError> {
    let body = body.trim();

    let text = if body.starts_with('{') {
        serde_json::from_str::<EchoBody>(body)
            .map_err(|e| ResolutionError::MalformedResponse(format!("unexpected JSON body: {}", e)))?
            .ip
    } else {
        body.to_string()
    };

    text.trim()
        .parse()
        .map_err(|_| ResolutionError::MalformedResponse(format!("not an address: {:?}", truncate(body))))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(64) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
