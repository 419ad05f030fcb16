//! Persistence for keys and usage history.
//!
//! The core never touches storage itself; the service hands it a
//! [`Snapshot`] to save after each mutation and loads one on startup.
//! Backends:
//! - [`SqliteStore`]: WAL-mode SQLite database
//! - [`JsonFileStore`]: a single JSON document in the extension's format
//! - [`MemoryStore`]: in-process, for tests and throwaway sessions
//!
//! [`FallbackStore`] chains two of them, trying the secondary only after
//! the primary reports an error. On load it reads whichever tier holds the
//! most recent save, so a change absorbed by the secondary while the
//! primary was down is not lost once the primary comes back.

pub mod json;
pub mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{ApiKey, UsageRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Stable machine-readable name for responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Corrupt(_) => "store_corrupt",
            Self::Io(_) => "store_io",
            Self::Sqlite(_) => "store_sqlite",
            Self::Serialize(_) => "store_serialize",
        }
    }
}

/// Everything that gets persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub api_keys: Vec<ApiKey>,
    pub usage: Vec<UsageRecord>,
}

/// Which backend accepted a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTier {
    Primary,
    Fallback,
}

pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Snapshot, StoreError>;
    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError>;
    /// Short description for log lines
    fn describe(&self) -> String;
    /// When the last successful save landed, if known
    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(None)
    }
}

impl<T: KeyStore + ?Sized> KeyStore for Box<T> {
    fn load(&self) -> Result<Snapshot, StoreError> {
        (**self).load()
    }
    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        (**self).save(snapshot)
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).saved_at()
    }
}

impl<T: KeyStore + ?Sized> KeyStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Snapshot, StoreError> {
        (**self).load()
    }
    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        (**self).save(snapshot)
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).saved_at()
    }
}

/// Primary store with a secondary written only when the primary fails,
/// and read back when it holds the newer save
pub struct FallbackStore<P, S> {
    primary: P,
    secondary: S,
}

impl<P: KeyStore, S: KeyStore> FallbackStore<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    /// Secondary snapshot, when its last save is later than the primary's
    fn newer_secondary(&self) -> Option<Snapshot> {
        let primary_at = self.primary.saved_at().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "primary save time unknown");
            None
        });
        let secondary_at = self.secondary.saved_at().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "fallback save time unknown");
            None
        });
        // None sorts before any time, so a never-written secondary is skipped
        if secondary_at <= primary_at {
            return None;
        }
        match self.secondary.load() {
            Ok(snapshot) => {
                tracing::warn!(
                    primary = %self.primary.describe(),
                    secondary = %self.secondary.describe(),
                    "fallback store holds newer data than primary, reading fallback"
                );
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    secondary = %self.secondary.describe(),
                    error = %e,
                    "fallback store newer but unreadable, keeping primary"
                );
                None
            }
        }
    }
}

impl<P: KeyStore, S: KeyStore> KeyStore for FallbackStore<P, S> {
    fn load(&self) -> Result<Snapshot, StoreError> {
        match self.primary.load() {
            Ok(snapshot) => Ok(self.newer_secondary().unwrap_or(snapshot)),
            Err(e) => {
                tracing::warn!(
                    primary = %self.primary.describe(),
                    secondary = %self.secondary.describe(),
                    error = %e,
                    "primary store load failed, reading fallback"
                );
                self.secondary.load()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        match self.primary.save(snapshot) {
            Ok(_) => Ok(StoreTier::Primary),
            Err(primary_err) => {
                tracing::warn!(
                    primary = %self.primary.describe(),
                    error = %primary_err,
                    "primary store save failed, writing fallback"
                );
                match self.secondary.save(snapshot) {
                    Ok(_) => Ok(StoreTier::Fallback),
                    Err(secondary_err) => Err(StoreError::Unavailable(format!(
                        "primary: {primary_err}; fallback: {secondary_err}"
                    ))),
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} (fallback {})", self.primary.describe(), self.secondary.describe())
    }

    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let primary = self.primary.saved_at().unwrap_or(None);
        let secondary = self.secondary.saved_at().unwrap_or(None);
        Ok(primary.max(secondary))
    }
}

/// In-process store; can be switched offline to exercise failure paths
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
    saved_at: Mutex<Option<DateTime<Utc>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Copy of the last saved snapshot
    pub fn contents(&self) -> Snapshot {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl KeyStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        self.check_online()?;
        Ok(self.contents())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        self.check_online()?;
        let mut guard = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot.clone();
        *self
            .saved_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
        Ok(StoreTier::Primary)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check_online()?;
        Ok(*self
            .saved_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}
