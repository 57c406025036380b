//! DNS record model
//!
//! A [`Record`] ties a hostname to an address of a declared family. The
//! constructor enforces that an `A` record holds an IPv4 address and an
//! `AAAA` record an IPv6 address, so every `Record` in the system is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// DNS record type managed by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name used by DNS providers
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Whether `address` belongs to this record's family
    pub fn matches(&self, address: &IpAddr) -> bool {
        Self::for_address(address) == *self
    }

    /// Record type for an address family
    pub fn for_address(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(Error::invalid_input(format!(
                "unsupported record type '{}', expected A or AAAA",
                other
            ))),
        }
    }
}

/// A hostname/address/type tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRecord")]
pub struct Record {
    hostname: String,
    address: IpAddr,
    record_type: RecordType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    hostname: String,
    address: IpAddr,
    record_type: RecordType,
}

impl TryFrom<RawRecord> for Record {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self> {
        Record::new(raw.hostname, raw.address, raw.record_type)
    }
}

impl Record {
    /// Create a record, rejecting an address of the wrong family
    pub fn new(
        hostname: impl Into<String>,
        address: IpAddr,
        record_type: RecordType,
    ) -> Result<Self> {
        let hostname = hostname.into();
        if hostname.trim().is_empty() {
            return Err(Error::invalid_input("record hostname cannot be empty"));
        }
        if !record_type.matches(&address) {
            return Err(Error::invalid_input(format!(
                "{} record cannot hold {} address {}",
                record_type,
                RecordType::for_address(&address),
                address
            )));
        }
        Ok(Self {
            hostname,
            address,
            record_type,
        })
    }

    /// Parse a textual address into a record
    pub fn parse(hostname: impl Into<String>, address: &str, record_type: RecordType) -> Result<Self> {
        let address: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| Error::invalid_input(format!("invalid address '{}'", address)))?;
        Self::new(hostname, address, record_type)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Whether this record already points `hostname` at `address`
    pub fn points_to(&self, hostname: &str, address: IpAddr, record_type: RecordType) -> bool {
        self.record_type == record_type
            && self.address == address
            && same_hostname(&self.hostname, hostname)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.hostname, self.record_type, self.address)
    }
}

/// Compare hostnames the way DNS does: case-insensitive, trailing dot ignored
pub fn same_hostname(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}
