use chrono::{Duration, TimeZone, Utc};

use prepper_alerts::state::{cooldown_bucket, AlertKey, StateStore};

fn key(title: &str) -> AlertKey {
    AlertKey::new("home", "nws", title, "nws")
}

#[test]
fn missing_file_is_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::load(&dir.path().join("nope/state.json")).unwrap();
    assert_eq!(store.seen_len(), 0);
    assert_eq!(store.cooldowns_len(), 0);
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = StateStore::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("parsing state file"));
}

#[test]
fn seen_survives_round_trip_with_exact_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/state.json");

    let odd = key("[HOME] Flood Warning / \"quoted\" — ünïcode");
    let mut store = StateStore::default();
    assert!(!store.is_seen(&odd));
    store.mark_seen(&odd);
    store.set_metadata("last_run_id", "abc");
    store.save(&path).unwrap();

    let back = StateStore::load(&path).unwrap();
    assert!(back.is_seen(&odd));
    assert!(!back.is_seen(&key("[HOME] Flood Warning")));
    assert_eq!(back.get_metadata("last_run_id", None).as_deref(), Some("abc"));
    assert_eq!(back.get_metadata("missing", Some("dflt")).as_deref(), Some("dflt"));
    assert_eq!(back, store);

    // Saving the loaded store reproduces the same bytes.
    let first = std::fs::read(&path).unwrap();
    back.save(&path).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn expired_cooldowns_are_evicted_before_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let bucket = cooldown_bucket("home", "nws", 2);

    let mut store = StateStore::default();
    store.start_cooldown_at(&bucket, 1, t0);
    assert!(store.in_cooldown_at(&bucket, t0));
    assert!(store.in_cooldown_at(&bucket, t0 + Duration::seconds(59)));
    // now == expiry is no longer cooling down.
    assert!(!store.in_cooldown_at(&bucket, t0 + Duration::minutes(1)));
    assert_eq!(store.cooldowns_len(), 0);

    store.save(&path).unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains(&bucket));
}

#[test]
fn prune_drops_only_old_entries() {
    let now = Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap();
    let mut store = StateStore::default();
    store.mark_seen_at(&key("old"), now - Duration::days(31));
    store.mark_seen_at(&key("recent"), now - Duration::days(2));

    assert_eq!(store.prune_seen(Duration::days(30), now), 1);
    assert!(!store.is_seen(&key("old")));
    assert!(store.is_seen(&key("recent")));
}
