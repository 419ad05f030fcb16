//! # Scoring Module
//!
//! Relevance of a key for the page being viewed. A score is the sum of
//! three independent terms:
//! - fresh: flat bonus for keys created recently
//! - usage: per-domain use count with exponential decay, capped
//! - recency: linear bonus for use on this domain within the last day

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::ledger::Ledger;
use crate::models::ApiKey;
use crate::utils::{domain_of, elapsed_days, elapsed_hours, env_f64};

/// Tunable scoring constants
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Keys created within this window get `fresh_bonus`
    pub fresh_window: TimeDelta,
    pub fresh_bonus: f64,
    /// Time constant of the usage decay, e^(-days/decay_days)
    pub decay_days: f64,
    pub usage_weight: f64,
    pub usage_cap: f64,
    /// Recency bonus starts at this many points and loses one per hour
    pub recency_window_hours: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fresh_window: TimeDelta::hours(12),
            fresh_bonus: 10.0,
            decay_days: 30.0,
            usage_weight: 2.0,
            usage_cap: 50.0,
            recency_window_hours: 24.0,
        }
    }
}

impl ScoringConfig {
    /// Defaults overridden by `KEYRANK_*` environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        let default_fresh_hours = d.fresh_window.num_milliseconds() as f64 / 3_600_000.0;
        let fresh_hours = env_f64("KEYRANK_FRESH_HOURS", default_fresh_hours);
        Self {
            fresh_window: TimeDelta::try_milliseconds((fresh_hours * 3_600_000.0) as i64)
                .unwrap_or(d.fresh_window),
            fresh_bonus: env_f64("KEYRANK_FRESH_BONUS", d.fresh_bonus),
            decay_days: env_f64("KEYRANK_DECAY_DAYS", d.decay_days),
            usage_weight: env_f64("KEYRANK_USAGE_WEIGHT", d.usage_weight),
            usage_cap: env_f64("KEYRANK_USAGE_CAP", d.usage_cap),
            recency_window_hours: env_f64("KEYRANK_RECENCY_HOURS", d.recency_window_hours),
        }
    }
}

/// Individual score terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub fresh: f64,
    pub usage: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.fresh + self.usage + self.recency
    }
}

/// Key paired with its score for one ranking pass
#[derive(Debug, Clone)]
pub struct ScoredKey<'a> {
    pub key: &'a ApiKey,
    pub breakdown: ScoreBreakdown,
}

impl ScoredKey<'_> {
    pub fn score(&self) -> f64 {
        self.breakdown.total()
    }
}

pub fn decay_factor(last_used: DateTime<Utc>, now: DateTime<Utc>, cfg: &ScoringConfig) -> f64 {
    if cfg.decay_days <= 0.0 {
        return 0.0;
    }
    (-elapsed_days(last_used, now) / cfg.decay_days).exp()
}

pub fn recency_bonus(last_used: DateTime<Utc>, now: DateTime<Utc>, cfg: &ScoringConfig) -> f64 {
    (cfg.recency_window_hours - elapsed_hours(last_used, now)).max(0.0)
}

pub fn is_fresh(key: &ApiKey, now: DateTime<Utc>, cfg: &ScoringConfig) -> bool {
    now - key.created_at < cfg.fresh_window
}

/// Score terms for `key` on an already-resolved domain
pub fn score_in_domain(
    key: &ApiKey,
    domain: Option<&str>,
    ledger: &Ledger,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown::default();
    if is_fresh(key, now, cfg) {
        breakdown.fresh = cfg.fresh_bonus;
    }
    if let Some(record) = domain.and_then(|d| ledger.get(d, &key.id)) {
        let decayed = record.use_count as f64 * decay_factor(record.last_used, now, cfg);
        breakdown.usage = (decayed * cfg.usage_weight).min(cfg.usage_cap);
        breakdown.recency = recency_bonus(record.last_used, now, cfg);
    }
    breakdown
}

pub fn score_breakdown(
    key: &ApiKey,
    url: &str,
    ledger: &Ledger,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> ScoreBreakdown {
    let domain = domain_of(url);
    if domain.is_none() {
        tracing::debug!(url, "no host in url, usage terms skipped");
    }
    score_in_domain(key, domain.as_deref(), ledger, now, cfg)
}

pub fn score(
    key: &ApiKey,
    url: &str,
    ledger: &Ledger,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> f64 {
    score_breakdown(key, url, ledger, now, cfg).total()
}

/// Score every key and order by descending score.
///
/// The sort is stable, so equal scores keep the order of `keys`.
pub fn rank_scored<'a>(
    keys: &'a [ApiKey],
    url: &str,
    ledger: &Ledger,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Vec<ScoredKey<'a>> {
    let domain = domain_of(url);
    let mut scored: Vec<ScoredKey<'a>> = keys
        .iter()
        .map(|key| ScoredKey {
            key,
            breakdown: score_in_domain(key, domain.as_deref(), ledger, now, cfg),
        })
        .collect();
    scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
    tracing::debug!(
        domain = domain.as_deref().unwrap_or("-"),
        keys = scored.len(),
        top = scored.first().map(|s| s.score()).unwrap_or(0.0),
        "ranked keys"
    );
    scored
}

pub fn rank<'a>(
    keys: &'a [ApiKey],
    url: &str,
    ledger: &Ledger,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Vec<&'a ApiKey> {
    rank_scored(keys, url, ledger, now, cfg)
        .into_iter()
        .map(|s| s.key)
        .collect()
}
