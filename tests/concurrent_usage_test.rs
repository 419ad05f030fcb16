use chrono::{TimeDelta, Utc};
use keyrank::service::{KeyService, ServiceConfig};
use keyrank::store::{KeyStore, MemoryStore, SqliteStore};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// Rapid usage events for the same key from many threads land in one record
#[test]
fn test_concurrent_usage_single_record() {
    let service = Arc::new(KeyService::new(MemoryStore::new(), ServiceConfig::default()));
    let now = Utc::now();
    let (key, _) = service.add_key("Shared", "sk-shared-1", now).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            let key_id = key.id.clone();
            thread::spawn(move || {
                for j in 0..50 {
                    let url = format!("https://shop.example.com/t{i}/p{j}");
                    let at = now + TimeDelta::milliseconds(i * 1000 + j);
                    service.record_usage(&key_id, &url, at).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let records = service.usage_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].domain, "shop.example.com");
    assert_eq!(records[0].use_count, 400);
    assert_eq!(service.store().contents().usage[0].use_count, 400);
}

/// Ranking while usage is being recorded never observes a torn state
#[test]
fn test_rank_during_updates() {
    let service = Arc::new(KeyService::new(MemoryStore::new(), ServiceConfig::default()));
    let now = Utc::now();
    let (a, _) = service.add_key("A", "aaaaaaaaaa", now - TimeDelta::days(3)).unwrap();
    service.add_key("B", "bbbbbbbbbb", now - TimeDelta::days(3)).unwrap();

    let writer = {
        let service = Arc::clone(&service);
        let id = a.id.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                service.record_usage(&id, "https://api.example.com/", now).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let ranked = service.rank("https://api.example.com/", now);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score() >= ranked[1].score());
    }
    writer.join().unwrap();

    let ranked = service.rank("https://api.example.com/", now);
    assert_eq!(ranked[0].key.id, a.id);
}

/// Same invariant through the SQLite store, then re-read from disk
#[test]
fn test_concurrent_usage_sqlite_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_concurrent.db");
    let service = Arc::new(KeyService::new(
        SqliteStore::new(&db_path),
        ServiceConfig::default(),
    ));
    let now = Utc::now();
    let (key, _) = service.add_key("Db", "sk-db-000000", now).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let service = Arc::clone(&service);
            let key_id = key.id.clone();
            // Add stagger to reduce initial contention
            thread::sleep(std::time::Duration::from_millis(i * 10));
            thread::spawn(move || {
                for _ in 0..10 {
                    service
                        .record_usage(&key_id, "https://a.example.com/x", Utc::now())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = SqliteStore::new(&db_path).load().unwrap();
    assert_eq!(snapshot.api_keys.len(), 1);
    assert_eq!(snapshot.usage.len(), 1);
    assert_eq!(snapshot.usage[0].use_count, 40);

    let reopened = KeyService::open(SqliteStore::new(&db_path), ServiceConfig::default()).unwrap();
    assert_eq!(reopened.history_for("https://a.example.com/y")[0].use_count, 40);
}
