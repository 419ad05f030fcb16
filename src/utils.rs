use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::env;
use std::io::Read;
use std::path::PathBuf;

pub const DEFAULT_RETENTION_DAYS: i64 = 90;
/// Number of secret characters shown before the ellipsis
pub const SECRET_PREVIEW_CHARS: usize = 8;
/// Keys shown in the "top" section of text output
pub const TOP_KEYS: usize = 3;

const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

/// Host component of a URL, lowercased. `None` when there is no host.
///
/// Bare hosts such as `example.com/path` are accepted by assuming https.
pub fn domain_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            url::Url::parse(&format!("https://{raw}")).ok()?
        }
        Err(_) => return None,
    };
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_ascii_lowercase())
}

/// Milliseconds from `then` to `now`, never negative
fn elapsed_ms(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds().max(0) as f64
}

pub fn elapsed_hours(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    elapsed_ms(then, now) / MS_PER_HOUR
}

pub fn elapsed_days(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    elapsed_ms(then, now) / MS_PER_DAY
}

pub fn truncate_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(SECRET_PREVIEW_CHARS).collect();
    format!("{prefix}...")
}

/// Compact age such as `5m`, `3h`, `12d`
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

/// Read a float tunable from the environment, ignoring unparsable or negative values
pub fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

pub fn retention_horizon(days: i64) -> TimeDelta {
    TimeDelta::try_days(days.max(0)).unwrap_or(TimeDelta::MAX)
}

/// Base directory for keyrank data (`~/.keyrank`)
pub fn data_dir() -> Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new().context("Failed to find home directory")?;
    Ok(base_dirs.home_dir().join(".keyrank"))
}

pub fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}
