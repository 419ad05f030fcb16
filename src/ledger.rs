//! # Ledger Module
//!
//! Per-domain, per-key usage history. Records are keyed by domain and then
//! by key id, so there is never more than one record for a pair.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;

use crate::models::UsageRecord;
use crate::utils::domain_of;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    by_domain: BTreeMap<String, BTreeMap<String, UsageRecord>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from stored records, reconciling duplicates
    pub fn from_records<I: IntoIterator<Item = UsageRecord>>(records: I) -> Self {
        let mut ledger = Self::new();
        for record in records {
            ledger.merge(record);
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.by_domain.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    /// All records, ordered by domain then key id
    pub fn records(&self) -> impl Iterator<Item = &UsageRecord> {
        self.by_domain.values().flat_map(BTreeMap::values)
    }

    pub fn to_records(&self) -> Vec<UsageRecord> {
        self.records().cloned().collect()
    }

    pub fn get(&self, domain: &str, key_id: &str) -> Option<&UsageRecord> {
        self.by_domain.get(domain)?.get(key_id)
    }

    /// Count one use of `key_id` on the host of `url`.
    ///
    /// Returns `None` without touching the ledger when the URL has no host.
    pub fn record_usage(
        &mut self,
        key_id: &str,
        url: &str,
        now: DateTime<Utc>,
    ) -> Option<&UsageRecord> {
        let domain = domain_of(url)?;
        Some(self.record_usage_in(key_id, &domain, now))
    }

    /// Count one use of `key_id` on an already-resolved domain
    pub fn record_usage_in(&mut self, key_id: &str, domain: &str, now: DateTime<Utc>) -> &UsageRecord {
        let domain = domain.to_ascii_lowercase();
        let record = self
            .by_domain
            .entry(domain.clone())
            .or_default()
            .entry(key_id.to_string())
            .and_modify(|r| {
                r.use_count = r.use_count.saturating_add(1);
                r.last_used = now;
            })
            .or_insert_with(|| UsageRecord::new(&domain, key_id, now));
        tracing::debug!(
            domain = %record.domain,
            key_id,
            use_count = record.use_count,
            "recorded usage"
        );
        record
    }

    /// Fold a record into the ledger: counts add up, the latest use wins
    pub fn merge(&mut self, record: UsageRecord) {
        let domain = record.domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return;
        }
        let slot = self.by_domain.entry(domain.clone()).or_default();
        match slot.get_mut(&record.key_id) {
            Some(existing) => {
                existing.use_count = existing.use_count.saturating_add(record.use_count);
                existing.last_used = existing.last_used.max(record.last_used);
            }
            None => {
                slot.insert(
                    record.key_id.clone(),
                    UsageRecord { domain, ..record },
                );
            }
        }
    }

    /// Records for the host of `url`; empty when the URL has no host
    pub fn history_for(&self, url: &str) -> Vec<&UsageRecord> {
        domain_of(url)
            .and_then(|d| self.by_domain.get(&d))
            .map(|keys| keys.values().collect())
            .unwrap_or_default()
    }

    /// Every record for one key across all domains
    pub fn records_for_key<'a>(&'a self, key_id: &'a str) -> impl Iterator<Item = &'a UsageRecord> {
        self.records().filter(move |r| r.key_id == key_id)
    }

    /// Drop records last used before `now - horizon`. Returns how many went.
    pub fn prune(&mut self, horizon: TimeDelta, now: DateTime<Utc>) -> usize {
        let cutoff = now.checked_sub_signed(horizon).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.len();
        for records in self.by_domain.values_mut() {
            records.retain(|_, r| r.last_used >= cutoff);
        }
        self.by_domain.retain(|_, records| !records.is_empty());
        let removed = before - self.len();
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "pruned usage records");
        }
        removed
    }
}
