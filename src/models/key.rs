use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::millis;
use crate::utils::truncate_secret;

/// A stored API key. Only `last_used` changes after creation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    /// Secret value (`key` on the wire, matching the extension's storage)
    #[serde(rename = "key")]
    pub secret: String,
    pub name: String,
    #[serde(with = "millis", default = "millis::epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "millis", default = "millis::epoch")]
    pub last_used: DateTime<Utc>,
}

impl ApiKey {
    /// Create a key with a fresh random id, stamped at `now`
    pub fn new(name: &str, secret: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            secret: secret.to_string(),
            name: name.to_string(),
            created_at: now,
            last_used: now,
        }
    }

    /// Secret shortened for display
    pub fn masked(&self) -> String {
        truncate_secret(&self.secret)
    }
}

// Keep secrets out of debug output and logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &self.masked())
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .finish()
    }
}
