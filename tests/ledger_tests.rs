use chrono::{DateTime, TimeDelta, Utc};
use keyrank::ledger::Ledger;
use keyrank::models::UsageRecord;

fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-10-18T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn test_same_host_reconciles_to_one_record() {
    let now = fixed_now();
    let mut ledger = Ledger::new();
    ledger.record_usage("k1", "https://a.example.com/x", now);
    ledger.record_usage("k1", "https://a.example.com/y", now);

    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.get("a.example.com", "k1").unwrap().use_count, 2);
}

#[test]
fn test_use_count_equals_number_of_calls() {
    let now = fixed_now();
    let mut ledger = Ledger::new();
    for i in 0..25 {
        let url = format!("https://api.example.com/page/{i}?q={i}");
        ledger.record_usage("k1", &url, now + TimeDelta::seconds(i));
    }
    let history = ledger.history_for("https://api.example.com/");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].use_count, 25);
    assert_eq!(history[0].last_used, now + TimeDelta::seconds(24));
}

#[test]
fn test_event_order_does_not_change_count() {
    let now = fixed_now();
    let t1 = now - TimeDelta::minutes(2);
    let t2 = now - TimeDelta::minutes(1);

    let mut forward = Ledger::new();
    forward.record_usage("k", "https://a.io/", t1);
    forward.record_usage("k", "https://a.io/", t2);

    let mut reverse = Ledger::new();
    reverse.record_usage("k", "https://a.io/", t2);
    reverse.record_usage("k", "https://a.io/", t1);

    assert_eq!(
        forward.get("a.io", "k").unwrap().use_count,
        reverse.get("a.io", "k").unwrap().use_count
    );
    // Last-used reflects whichever event was applied last
    assert_eq!(forward.get("a.io", "k").unwrap().last_used, t2);
    assert_eq!(reverse.get("a.io", "k").unwrap().last_used, t1);
}

#[test]
fn test_keys_and_domains_are_separate_records() {
    let now = fixed_now();
    let mut ledger = Ledger::new();
    ledger.record_usage("k1", "https://a.io/", now);
    ledger.record_usage("k2", "https://a.io/", now);
    ledger.record_usage("k1", "https://b.io/", now);
    ledger.record_usage("k1", "https://sub.a.io/", now);
    assert_eq!(ledger.len(), 4);
}

#[test]
fn test_prune_retention_scenario() {
    let now = fixed_now();
    let mut ledger = Ledger::new();
    ledger.record_usage("old", "https://a.example.com/", now - TimeDelta::days(100));
    ledger.record_usage("new", "https://a.example.com/", now - TimeDelta::days(10));

    let removed = ledger.prune(TimeDelta::days(90), now);
    assert_eq!(removed, 1);
    assert!(ledger.get("a.example.com", "old").is_none());
    let kept = ledger.get("a.example.com", "new").unwrap();
    assert_eq!(kept.use_count, 1);
    assert_eq!(kept.last_used, now - TimeDelta::days(10));
}

#[test]
fn test_prune_leaves_nothing_older_than_cutoff() {
    let now = fixed_now();
    let horizon = TimeDelta::days(30);
    let mut ledger = Ledger::new();
    for d in 0..120 {
        ledger.record_usage(&format!("k{d}"), "https://a.io/", now - TimeDelta::days(d));
    }
    let before: Vec<UsageRecord> = ledger
        .records()
        .filter(|r| r.last_used >= now - horizon)
        .cloned()
        .collect();

    ledger.prune(horizon, now);
    assert!(ledger.records().all(|r| r.last_used >= now - horizon));
    let after: Vec<UsageRecord> = ledger.to_records();
    assert_eq!(before, after);

    // Pruning again is a no-op
    assert_eq!(ledger.prune(horizon, now), 0);
}

#[test]
fn test_epoch_records_are_pruned() {
    let now = fixed_now();
    let ledger_records = vec![UsageRecord {
        domain: "a.io".into(),
        key_id: "k".into(),
        use_count: 3,
        last_used: DateTime::UNIX_EPOCH,
    }];
    let mut ledger = Ledger::from_records(ledger_records);
    assert_eq!(ledger.prune(TimeDelta::days(90), now), 1);
    assert!(ledger.is_empty());
}
