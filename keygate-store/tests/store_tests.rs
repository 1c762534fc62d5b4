use chrono::{TimeZone, Utc};
use keygate_store::{BindOutcome, CreateOutcome, DeleteOutcome, KeyStore, SqliteKeyStore};
use pretty_assertions::assert_eq;

fn now_at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

// ── Provisioning ─────────────────────────────────────────────────

#[test]
fn create_then_get_unbound() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    assert_eq!(store.create(Some("pkg.app"), "k1").unwrap(), CreateOutcome::Created);

    let record = store.get(Some("pkg.app"), "k1").unwrap().unwrap();
    assert_eq!(record.scope.as_deref(), Some("pkg.app"));
    assert_eq!(record.key_id, "k1");
    assert!(!record.bound);
    assert_eq!(record.device_id, None);
    assert_eq!(record.last_verified, None);
}

#[test]
fn create_is_never_an_overwrite() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(None, "k1").unwrap();
    store.compare_and_bind(None, "k1", "dev-a", now_at(1_700_000_000)).unwrap();

    assert_eq!(store.create(None, "k1").unwrap(), CreateOutcome::AlreadyExists);
    let record = store.get(None, "k1").unwrap().unwrap();
    assert!(record.bound);
    assert_eq!(record.device_id.as_deref(), Some("dev-a"));
}

#[test]
fn same_key_id_is_distinct_across_scopes() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    assert_eq!(store.create(Some("pkg.a"), "k1").unwrap(), CreateOutcome::Created);
    assert_eq!(store.create(Some("pkg.b"), "k1").unwrap(), CreateOutcome::Created);
    assert_eq!(store.create(None, "k1").unwrap(), CreateOutcome::Created);

    store.compare_and_bind(Some("pkg.a"), "k1", "dev-a", now_at(1_700_000_000)).unwrap();
    assert!(!store.get(Some("pkg.b"), "k1").unwrap().unwrap().bound);
    assert!(!store.get(None, "k1").unwrap().unwrap().bound);
}

#[test]
fn get_missing_returns_none() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    assert!(store.get(Some("pkg.app"), "nope").unwrap().is_none());
    assert!(store.get(None, "nope").unwrap().is_none());
}

#[test]
fn delete_outcomes() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(Some("pkg.app"), "k1").unwrap();

    assert_eq!(store.delete(Some("pkg.app"), "k1").unwrap(), DeleteOutcome::Deleted);
    assert_eq!(store.delete(Some("pkg.app"), "k1").unwrap(), DeleteOutcome::NotFound);
    assert!(store.get(Some("pkg.app"), "k1").unwrap().is_none());
}

#[test]
fn delete_ignores_binding_state() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(None, "k1").unwrap();
    store.compare_and_bind(None, "k1", "dev-a", now_at(1_700_000_000)).unwrap();

    assert_eq!(store.delete(None, "k1").unwrap(), DeleteOutcome::Deleted);
    assert!(store.get(None, "k1").unwrap().is_none());
}

// ── Compare-and-bind ─────────────────────────────────────────────

#[test]
fn first_claim_binds() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(Some("pkg.app"), "k1").unwrap();

    let now = now_at(1_700_000_000);
    match store.compare_and_bind(Some("pkg.app"), "k1", "dev-a", now).unwrap() {
        BindOutcome::Bound(record) => {
            assert!(record.bound);
            assert_eq!(record.device_id.as_deref(), Some("dev-a"));
            assert_eq!(record.last_verified, Some(now));
        }
        other => panic!("expected Bound, got {:?}", other),
    }
}

#[test]
fn same_device_reverifies_and_refreshes_timestamp() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(None, "k1").unwrap();

    store.compare_and_bind(None, "k1", "dev-a", now_at(1_700_000_000)).unwrap();
    let later = now_at(1_700_000_060);
    match store.compare_and_bind(None, "k1", "dev-a", later).unwrap() {
        BindOutcome::Reverified(record) => {
            assert_eq!(record.device_id.as_deref(), Some("dev-a"));
            assert_eq!(record.last_verified, Some(later));
        }
        other => panic!("expected Reverified, got {:?}", other),
    }

    let stored = store.get(None, "k1").unwrap().unwrap();
    assert_eq!(stored.last_verified, Some(later));
}

#[test]
fn foreign_device_conflicts_without_mutation() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(Some("pkg.app"), "k1").unwrap();

    let bound_at = now_at(1_700_000_000);
    store.compare_and_bind(Some("pkg.app"), "k1", "dev-a", bound_at).unwrap();

    match store
        .compare_and_bind(Some("pkg.app"), "k1", "dev-b", now_at(1_700_000_120))
        .unwrap()
    {
        BindOutcome::Conflict(record) => {
            assert_eq!(record.device_id.as_deref(), Some("dev-a"));
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // The rejected attempt left the record untouched.
    let stored = store.get(Some("pkg.app"), "k1").unwrap().unwrap();
    assert_eq!(stored.device_id.as_deref(), Some("dev-a"));
    assert_eq!(stored.last_verified, Some(bound_at));
}

#[test]
fn bind_missing_key_writes_nothing() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    let outcome = store
        .compare_and_bind(Some("pkg.app"), "ghost", "dev-a", now_at(1_700_000_000))
        .unwrap();
    assert_eq!(outcome, BindOutcome::Missing);
    assert!(store.get(Some("pkg.app"), "ghost").unwrap().is_none());
}

#[test]
fn scoped_bind_does_not_touch_unscoped_pool() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(None, "k1").unwrap();

    let outcome = store
        .compare_and_bind(Some("pkg.app"), "k1", "dev-a", now_at(1_700_000_000))
        .unwrap();
    assert_eq!(outcome, BindOutcome::Missing);
    assert!(!store.get(None, "k1").unwrap().unwrap().bound);
}

// ── Listing ──────────────────────────────────────────────────────

#[test]
fn list_used_returns_only_bound_records() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(Some("pkg.app"), "k1").unwrap();
    store.create(Some("pkg.app"), "k2").unwrap();
    store.create(None, "simple-1").unwrap();

    store.compare_and_bind(Some("pkg.app"), "k1", "dev-a", now_at(1_700_000_000)).unwrap();
    store.compare_and_bind(None, "simple-1", "dev-b", now_at(1_700_000_001)).unwrap();

    let used = store.list_used().unwrap();
    assert_eq!(used.len(), 2);
    assert!(used.iter().all(|r| r.bound && r.device_id.is_some()));
    assert!(used.iter().any(|r| r.scope.is_none() && r.key_id == "simple-1"));
    assert!(used.iter().any(|r| r.scope.as_deref() == Some("pkg.app") && r.key_id == "k1"));
}

#[test]
fn list_used_on_fresh_store_is_empty() {
    let store = SqliteKeyStore::open_in_memory().unwrap();
    store.create(None, "k1").unwrap();
    assert!(store.list_used().unwrap().is_empty());
}

// ── Durability ───────────────────────────────────────────────────

#[test]
fn bindings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.db");

    let bound_at = now_at(1_700_000_000);
    {
        let store = SqliteKeyStore::open(&path).unwrap();
        store.create(Some("pkg.app"), "k1").unwrap();
        store.compare_and_bind(Some("pkg.app"), "k1", "dev-a", bound_at).unwrap();
    }

    let reopened = SqliteKeyStore::open(&path).unwrap();
    let record = reopened.get(Some("pkg.app"), "k1").unwrap().unwrap();
    assert!(record.bound);
    assert_eq!(record.device_id.as_deref(), Some("dev-a"));
    assert_eq!(record.last_verified, Some(bound_at));
}
