//! SQLite-backed key store.
//!
//! - Schema versioning through a `metadata` table
//! - WAL mode and a busy timeout so several processes can share the file
//! - `(domain, key_id)` primary key on usage rows, mirroring the ledger

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::{KeyStore, Snapshot, StoreError, StoreTier};
use crate::models::millis::from_millis;
use crate::models::{ApiKey, UsageRecord};
use crate::utils::data_dir;

const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `KEYRANK_DB_PATH`, or `~/.keyrank/keyrank.db`
    pub fn from_env() -> Result<Self, StoreError> {
        if let Ok(custom_path) = env::var("KEYRANK_DB_PATH") {
            return Ok(Self::new(custom_path));
        }
        let dir = data_dir().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(dir.join("keyrank.db")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open with WAL mode, retrying briefly while another process holds a lock
    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let mut attempts = 0;
        let max_attempts = 3;

        loop {
            match Connection::open(&self.path) {
                Ok(conn) => {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "busy_timeout", 5000)?;
                    init_schema(&conn)?;
                    return Ok(conn);
                }
                Err(e) if e.to_string().contains("locked") && attempts < max_attempts => {
                    attempts += 1;
                    thread::sleep(Duration::from_millis(100 * attempts));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch a metadata value (opens a short-lived connection)
    pub fn load_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.open()?;
        get_metadata(&conn, key)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            secret TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at INTEGER,
            last_used INTEGER
        );
        CREATE TABLE IF NOT EXISTS usage_records (
            domain TEXT NOT NULL,
            key_id TEXT NOT NULL,
            use_count INTEGER NOT NULL,
            last_used INTEGER,
            PRIMARY KEY (domain, key_id)
        );
        CREATE INDEX IF NOT EXISTS idx_usage_last_used ON usage_records(last_used);
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER
        );
        INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1');",
    )?;

    let version = get_metadata(conn, "schema_version")?;
    if version.as_deref() != Some(SCHEMA_VERSION) {
        return Err(StoreError::Corrupt(format!(
            "unsupported schema version {}",
            version.unwrap_or_default()
        )));
    }
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = ?1")?;
    let result = stmt
        .query_row(params![key], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(result)
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO metadata (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}

/// Timestamp column that may be NULL or hold junk; both read as the epoch
fn millis_column(row: &rusqlite::Row<'_>, idx: usize) -> chrono::DateTime<Utc> {
    row.get::<_, Option<i64>>(idx)
        .unwrap_or(None)
        .map(from_millis)
        .unwrap_or_else(crate::models::millis::epoch)
}

impl KeyStore for SqliteStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let conn = self.open()?;

        let mut stmt = conn.prepare(
            "SELECT id, secret, name, created_at, last_used FROM api_keys ORDER BY position, id",
        )?;
        let api_keys = stmt
            .query_map([], |row| {
                Ok(ApiKey {
                    id: row.get(0)?,
                    secret: row.get(1)?,
                    name: row.get(2)?,
                    created_at: millis_column(row, 3),
                    last_used: millis_column(row, 4),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT domain, key_id, use_count, last_used FROM usage_records ORDER BY domain, key_id",
        )?;
        let usage = stmt
            .query_map([], |row| {
                Ok(UsageRecord {
                    domain: row.get(0)?,
                    key_id: row.get(1)?,
                    use_count: row.get::<_, i64>(2)?.max(0) as u64,
                    last_used: millis_column(row, 3),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot { api_keys, usage })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<StoreTier, StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM api_keys", [])?;
        tx.execute("DELETE FROM usage_records", [])?;
        {
            let mut insert_key = tx.prepare(
                "INSERT INTO api_keys (id, position, secret, name, created_at, last_used)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for (position, key) in snapshot.api_keys.iter().enumerate() {
                insert_key.execute(params![
                    key.id,
                    position as i64,
                    key.secret,
                    key.name,
                    key.created_at.timestamp_millis(),
                    key.last_used.timestamp_millis(),
                ])?;
            }

            // Duplicates fold together here the same way the ledger merges them
            let mut insert_usage = tx.prepare(
                "INSERT INTO usage_records (domain, key_id, use_count, last_used)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(domain, key_id) DO UPDATE SET
                     use_count = use_count + excluded.use_count,
                     last_used = MAX(last_used, excluded.last_used)",
            )?;
            for record in &snapshot.usage {
                insert_usage.execute(params![
                    record.domain,
                    record.key_id,
                    record.use_count.min(i64::MAX as u64) as i64,
                    record.last_used.timestamp_millis(),
                ])?;
            }
        }
        set_metadata(&tx, "last_saved_at", &Utc::now().to_rfc3339())?;
        tx.commit()?;
        Ok(StoreTier::Primary)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn saved_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .load_metadata("last_saved_at")?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    #[test]
    fn test_db_init() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"));

        let version = store.load_metadata("schema_version").unwrap().unwrap();
        assert_eq!(version, "1");
        assert_eq!(store.load().unwrap(), Snapshot::default());
        assert_eq!(store.saved_at().unwrap(), None);
    }

    #[test]
    fn test_round_trip_preserves_key_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("nested/dir/test.db"));
        let now = Utc::now();

        let snapshot = Snapshot {
            api_keys: vec![
                ApiKey::new("zeta", "z-secret", now),
                ApiKey::new("alpha", "a-secret", now - TimeDelta::hours(2)),
            ],
            usage: vec![UsageRecord::new("shop.example.com", "k1", now)],
        };
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_keys.len(), 2);
        assert_eq!(loaded.api_keys[0].name, "zeta");
        assert_eq!(loaded.api_keys[1].name, "alpha");
        assert_eq!(
            loaded.api_keys[1].created_at.timestamp_millis(),
            (now - TimeDelta::hours(2)).timestamp_millis()
        );
        assert_eq!(loaded.usage.len(), 1);
        let saved_at = store.saved_at().unwrap().unwrap();
        assert!(saved_at >= now - TimeDelta::seconds(1));
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"));
        let now = Utc::now();

        let mut snapshot = Snapshot {
            api_keys: vec![ApiKey::new("a", "1", now), ApiKey::new("b", "2", now)],
            usage: Vec::new(),
        };
        store.save(&snapshot).unwrap();
        snapshot.api_keys.remove(0);
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_keys.len(), 1);
        assert_eq!(loaded.api_keys[0].name, "b");
    }

    #[test]
    fn test_duplicate_usage_rows_fold() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"));
        let now = Utc::now();

        let mut older = UsageRecord::new("a.example.com", "k1", now - TimeDelta::days(1));
        older.use_count = 4;
        let snapshot = Snapshot {
            api_keys: Vec::new(),
            usage: vec![UsageRecord::new("a.example.com", "k1", now), older],
        };
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.usage.len(), 1);
        assert_eq!(loaded.usage[0].use_count, 5);
        assert_eq!(loaded.usage[0].last_used.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_null_timestamps_read_as_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"));
        let conn = store.open().unwrap();
        conn.execute(
            "INSERT INTO api_keys (id, position, secret, name, created_at, last_used)
             VALUES ('k', 0, 's', 'n', NULL, 'not-a-number')",
            [],
        )
        .unwrap();
        drop(conn);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_keys[0].created_at, crate::models::millis::epoch());
        assert_eq!(loaded.api_keys[0].last_used, crate::models::millis::epoch());
    }

    #[test]
    #[serial_test::serial]
    fn test_path_from_env() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("env.db");
        // SAFETY: Test runs serially, no concurrent env access
        unsafe { env::set_var("KEYRANK_DB_PATH", db_path.to_str().unwrap()) };

        let store = SqliteStore::from_env().unwrap();
        assert_eq!(store.path(), db_path.as_path());

        unsafe { env::remove_var("KEYRANK_DB_PATH") };
    }
}
