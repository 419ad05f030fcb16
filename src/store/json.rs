//! JSON document store, laid out like the extension's local backup:
//! `{ "apiKeys": [...], "usageHistory": [...] }`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::{KeyStore, Snapshot, StoreError, StoreTier};
use crate::models::{ApiKey, UsageEntry, UsageRecord};
use crate::utils::data_dir;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    api_keys: Vec<ApiKey>,
    #[serde(default, alias = "urlUsageHistory")]
    usage_history: Vec<UsageEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRef<'a> {
    api_keys: &'a [ApiKey],
    usage_history: &'a [UsageRecord],
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `KEYRANK_JSON_PATH`, or `~/.keyrank/keys.json`
    pub fn from_env() -> Result<Self, StoreError> {
        if let Ok(custom_path) = env::var("KEYRANK_JSON_PATH") {
            return Ok(Self::new(custom_path));
        }
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(dir.join("keys.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Snapshot::default());
        }
        let doc: Document = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;

        let total = doc.usage_history.len();
        let usage: Vec<UsageRecord> = doc
            .usage_history
            .into_iter()
            .filter_map(UsageEntry::into_record)
            .collect();
        if usage.len() < total {
            tracing::warn!(
                dropped = total - usage.len(),
                path = %self.path.display(),
                "skipped usage entries without a host"
            );
        }
        Ok(Snapshot {
            api_keys: doc.api_keys,
            usage,
        })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(&DocumentRef {
            api_keys: &snapshot.api_keys,
            usage_history: &snapshot.usage,
        })?;
        // Write-then-rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(StoreTier::Primary)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    /// Modification time of the document
    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let modified = fs::metadata(&self.path)?.modified()?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }
}
