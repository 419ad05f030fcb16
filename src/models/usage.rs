use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::millis;
use crate::utils::domain_of;

/// Accumulated usage of one key on one domain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub domain: String,
    pub key_id: String,
    pub use_count: u64,
    #[serde(with = "millis", default = "millis::epoch")]
    pub last_used: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(domain: &str, key_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_ascii_lowercase(),
            key_id: key_id.to_string(),
            use_count: 1,
            last_used: now,
        }
    }
}

/// Usage record as found in storage. Older extension builds stored the full
/// page URL instead of the domain.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub key_id: String,
    #[serde(default)]
    pub use_count: u64,
    #[serde(with = "millis", default = "millis::epoch")]
    pub last_used: DateTime<Utc>,
}

impl UsageEntry {
    /// Normalize to a domain-keyed record; `None` if no host can be derived
    pub fn into_record(self) -> Option<UsageRecord> {
        let domain = match self.domain.filter(|d| !d.trim().is_empty()) {
            Some(d) => d.trim().to_ascii_lowercase(),
            None => domain_of(self.url.as_deref()?)?,
        };
        Some(UsageRecord {
            domain,
            key_id: self.key_id,
            use_count: self.use_count,
            last_used: self.last_used,
        })
    }
}
