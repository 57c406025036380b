//! Hostup API payloads
//!
//! Every success response is wrapped as `{success, requestId, data}`; error
//! responses use `{error, message, code, timestamp, requestId}`. The API is
//! inconsistent about whether ids are numbers or strings, so ids are
//! accepted as either and kept as strings.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Success envelope shared by every endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub request_id: Option<String>,
    pub data: T,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl ErrorBody {
    /// Most specific human-readable text in the body
    pub fn summary(&self) -> Option<String> {
        match (&self.error, &self.message) {
            (Some(error), Some(message)) => Some(format!("{}: {}", error, message)),
            (None, Some(text)) | (Some(text), None) => Some(text.clone()),
            (None, None) => None,
        }
    }
}

/// `GET dns/zones`
#[derive(Debug, Clone, Deserialize)]
pub struct ZonesData {
    pub zones: Vec<Zone>,
}

/// A DNS zone owned by the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub server_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub account_id: Option<String>,
    /// Id used in the records endpoints
    #[serde(deserialize_with = "lenient_string")]
    pub domain_id: String,
    pub domain: String,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}  {}", self.domain_id, self.domain)
    }
}

/// `GET dns/zones/{zoneId}/records`
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneRecordsData {
    pub zone: ZoneRecords,
}

/// A zone together with its records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecords {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub records: Vec<DnsRecord>,
}

/// `POST dns/zones/{zoneId}/records`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRecordData {
    pub record: DnsRecord,
}

/// `DELETE dns/zones/{zoneId}/records/{recordId}`
#[derive(Debug, Clone, Deserialize)]
pub struct DeletedRecordData {
    #[serde(default)]
    pub message: Option<String>,
}

/// A record as the API reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl DnsRecord {
    /// Value with the quoting the API adds to TXT records removed
    pub fn unquoted_value(&self) -> &str {
        let value = self.value.trim();
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10}  {:<5} {:<40} {}",
            self.id, self.record_type, self.name, self.value
        )?;
        if let Some(ttl) = self.ttl {
            write!(f, "  ttl={}", ttl)?;
        }
        if let Some(status) = &self.status {
            write!(f, "  [{}]", status)?;
        }
        Ok(())
    }
}

/// Body of a record creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub value: String,
    pub ttl: u32,
}

impl NewRecord {
    pub fn new(
        record_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            value: value.into(),
            ttl,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}
