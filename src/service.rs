//! # Service Module
//!
//! Owns the key collection and ledger ([`KeyRing`]) behind a mutex, applies
//! requests from the UI/background triggers, and writes a snapshot to the
//! configured [`KeyStore`] after every mutation. In-memory state stays
//! authoritative when a write fails.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Mutex, MutexGuard};

use crate::ledger::Ledger;
use crate::models::message::RankedKeyView;
use crate::models::{ApiKey, Request, Response, UsageRecord};
use crate::scoring::{ScoreBreakdown, ScoringConfig, rank_scored};
use crate::store::{KeyStore, Snapshot, StoreError, StoreTier};
use crate::utils::{DEFAULT_RETENTION_DAYS, domain_of, retention_horizon};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),
    #[error("{0}")]
    Validation(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::Validation(_) => "validation",
            Self::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub scoring: ScoringConfig,
    /// Usage older than this is pruned
    pub retention: TimeDelta,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            retention: retention_horizon(DEFAULT_RETENTION_DAYS),
        }
    }
}

/// Key collection plus usage ledger
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    pub keys: Vec<ApiKey>,
    pub ledger: Ledger,
}

impl KeyRing {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            keys: snapshot.api_keys,
            ledger: Ledger::from_records(snapshot.usage),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            api_keys: self.keys.clone(),
            usage: self.ledger.to_records(),
        }
    }
}

/// Key with its score, detached from the ring
#[derive(Debug, Clone)]
pub struct RankedKey {
    pub key: ApiKey,
    pub breakdown: ScoreBreakdown,
}

impl RankedKey {
    pub fn score(&self) -> f64 {
        self.breakdown.total()
    }

    pub fn view(&self) -> RankedKeyView {
        RankedKeyView {
            id: self.key.id.clone(),
            name: self.key.name.clone(),
            preview: self.key.masked(),
            score: self.score(),
            breakdown: self.breakdown,
        }
    }
}

/// Result of a usage event
#[derive(Debug, Clone)]
pub enum UsageOutcome {
    Recorded { record: UsageRecord, tier: StoreTier },
    /// Key id not in the collection; nothing changed
    UnknownKey,
}

pub struct KeyService<S> {
    ring: Mutex<KeyRing>,
    store: S,
    config: ServiceConfig,
}

impl<S: KeyStore> KeyService<S> {
    /// Service with empty state; call [`KeyService::reload`] to read the store
    pub fn new(store: S, config: ServiceConfig) -> Self {
        Self {
            ring: Mutex::new(KeyRing::default()),
            store,
            config,
        }
    }

    /// Service populated from the store
    pub fn open(store: S, config: ServiceConfig) -> Result<Self, ServiceError> {
        let service = Self::new(store, config);
        service.reload()?;
        Ok(service)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ring(&self) -> MutexGuard<'_, KeyRing> {
        self.ring
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, ring: &KeyRing) -> Result<StoreTier, ServiceError> {
        let tier = self.store.save(&ring.snapshot()).map_err(|e| {
            tracing::error!(store = %self.store.describe(), error = %e, "save failed, keeping in-memory state");
            e
        })?;
        if tier == StoreTier::Fallback {
            tracing::warn!(store = %self.store.describe(), "saved to fallback store");
        }
        Ok(tier)
    }

    /// Replace in-memory state with what the store holds. On failure the
    /// current state is kept.
    pub fn reload(&self) -> Result<(), ServiceError> {
        let snapshot = self.store.load()?;
        let mut ring = self.ring();
        *ring = KeyRing::from_snapshot(snapshot);
        tracing::debug!(
            keys = ring.keys.len(),
            usage_records = ring.ledger.len(),
            store = %self.store.describe(),
            "loaded key ring"
        );
        Ok(())
    }

    /// Copy of the current collection in insertion order
    pub fn keys(&self) -> Vec<ApiKey> {
        self.ring().keys.clone()
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.ring().ledger.to_records()
    }

    pub fn history_for(&self, url: &str) -> Vec<UsageRecord> {
        self.ring()
            .ledger
            .history_for(url)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn rank(&self, url: &str, now: DateTime<Utc>) -> Vec<RankedKey> {
        let ring = self.ring();
        rank_scored(&ring.keys, url, &ring.ledger, now, &self.config.scoring)
            .into_iter()
            .map(|s| RankedKey {
                key: s.key.clone(),
                breakdown: s.breakdown,
            })
            .collect()
    }

    pub fn record_usage(
        &self,
        key_id: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<UsageOutcome, ServiceError> {
        let domain = domain_of(url).ok_or_else(|| ServiceError::InvalidUrl(url.to_string()))?;
        let mut ring = self.ring();
        let Some(key) = ring.keys.iter_mut().find(|k| k.id == key_id) else {
            tracing::debug!(key_id, "usage for unknown key ignored");
            return Ok(UsageOutcome::UnknownKey);
        };
        key.last_used = now;
        let record = ring.ledger.record_usage_in(key_id, &domain, now).clone();
        let tier = self.persist(&ring)?;
        Ok(UsageOutcome::Recorded { record, tier })
    }

    pub fn add_key(
        &self,
        name: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<(ApiKey, StoreTier), ServiceError> {
        let name = name.trim();
        let secret = secret.trim();
        if name.is_empty() || secret.is_empty() {
            return Err(ServiceError::Validation(
                "both a name and a value are required",
            ));
        }
        let key = ApiKey::new(name, secret, now);
        let mut ring = self.ring();
        ring.keys.push(key.clone());
        tracing::info!(key_id = %key.id, name = %key.name, "added key");
        let tier = self.persist(&ring)?;
        Ok((key, tier))
    }

    /// Remove a key. Its usage records stay until pruned.
    pub fn delete_key(&self, key_id: &str) -> Result<(bool, StoreTier), ServiceError> {
        let mut ring = self.ring();
        let before = ring.keys.len();
        ring.keys.retain(|k| k.id != key_id);
        let removed = ring.keys.len() < before;
        if removed {
            tracing::info!(key_id, "deleted key");
        }
        let tier = self.persist(&ring)?;
        Ok((removed, tier))
    }

    pub fn prune(&self, now: DateTime<Utc>) -> Result<(usize, StoreTier), ServiceError> {
        let mut ring = self.ring();
        let removed = ring.ledger.prune(self.config.retention, now);
        let tier = self.persist(&ring)?;
        Ok((removed, tier))
    }

    /// Write the current state to the store as-is
    pub fn flush(&self) -> Result<StoreTier, ServiceError> {
        let ring = self.ring();
        self.persist(&ring)
    }

    /// Install the three sample keys the extension ships with on first install.
    /// Refused once the collection holds any key.
    pub fn seed_demo(&self, now: DateTime<Utc>) -> Result<StoreTier, ServiceError> {
        let mut ring = self.ring();
        if !ring.keys.is_empty() {
            tracing::warn!(keys = ring.keys.len(), "demo keys not installed, store already has keys");
            return Err(ServiceError::Validation(
                "demo keys are only installed into an empty store",
            ));
        }
        ring.keys = vec![
            demo_key("1", "key1", "Key 1", now - TimeDelta::hours(24), now),
            demo_key("2", "key2", "Key 2", now - TimeDelta::hours(2), now),
            demo_key("3", "key3", "Key 3", now, now),
        ];
        self.persist(&ring)
    }

    /// Apply one trigger request and report the outcome
    pub fn handle(&self, request: Request, now: DateTime<Utc>) -> Response {
        let result = match request {
            Request::UpdateRanking { url } => Ok(Response {
                ranked: Some(self.rank(&url, now).iter().map(RankedKey::view).collect()),
                ..Response::ok()
            }),
            Request::TrackUsage { key_id, url } => {
                self.record_usage(&key_id, &url, now).map(|outcome| match outcome {
                    UsageOutcome::Recorded { tier, .. } => Response {
                        degraded: tier == StoreTier::Fallback,
                        ..Response::ok()
                    },
                    UsageOutcome::UnknownKey => Response::ok(),
                })
            }
            Request::AddApiKey { name, key } => {
                self.add_key(&name, &key, now).map(|(key, tier)| Response {
                    key: Some(key),
                    degraded: tier == StoreTier::Fallback,
                    ..Response::ok()
                })
            }
            Request::DeleteApiKey { key_id } => {
                self.delete_key(&key_id).map(|(_, tier)| Response {
                    degraded: tier == StoreTier::Fallback,
                    ..Response::ok()
                })
            }
            Request::ListKeys => Ok(Response {
                keys: Some(self.keys()),
                ..Response::ok()
            }),
            Request::Prune => self.prune(now).map(|(removed, tier)| Response {
                removed: Some(removed),
                degraded: tier == StoreTier::Fallback,
                ..Response::ok()
            }),
        };
        result.unwrap_or_else(|e| Response::failed(e.kind(), e.to_string()))
    }
}

fn demo_key(
    id: &str,
    secret: &str,
    name: &str,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
) -> ApiKey {
    ApiKey {
        id: id.to_string(),
        secret: secret.to_string(),
        name: name.to_string(),
        created_at,
        last_used,
    }
}
