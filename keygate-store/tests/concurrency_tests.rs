use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use keygate_store::{BindOutcome, KeyStore, SqliteKeyStore};

// Two simultaneous first-claims for the same key must yield exactly one
// winner, never two.
#[test]
fn two_simultaneous_first_claims_one_winner() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    store.create(Some("pkg.app"), "k1").unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["dev-a", "dev-b"]
        .into_iter()
        .map(|device| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.compare_and_bind(Some("pkg.app"), "k1", device, Utc::now()).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = outcomes.iter().filter(|o| matches!(o, BindOutcome::Bound(_))).count();
    let conflicts = outcomes.iter().filter(|o| matches!(o, BindOutcome::Conflict(_))).count();
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 1);
}

// Many devices racing for one key: a single winner, and the stored owner is
// the winner.
#[test]
fn claim_storm_has_single_owner() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    store.create(None, "contested").unwrap();

    let devices: Vec<String> = (0..8).map(|i| format!("dev-{i}")).collect();
    let barrier = Arc::new(Barrier::new(devices.len()));
    let handles: Vec<_> = devices
        .iter()
        .cloned()
        .map(|device| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let outcome = store.compare_and_bind(None, "contested", &device, Utc::now()).unwrap();
                (device, outcome)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, BindOutcome::Bound(_)))
        .map(|(device, _)| device.clone())
        .collect();
    assert_eq!(winners.len(), 1);

    let record = store.get(None, "contested").unwrap().unwrap();
    assert_eq!(record.device_id.as_deref(), Some(winners[0].as_str()));
}

// Re-verification by the winner keeps succeeding while other devices keep
// being rejected, under interleaving.
#[test]
fn reverify_races_with_rejected_claims() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    store.create(None, "k1").unwrap();
    store.compare_and_bind(None, "k1", "owner", Utc::now()).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = ["owner", "intruder-1", "owner", "intruder-2"]
        .into_iter()
        .map(|device| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.compare_and_bind(None, "k1", device, Utc::now()).unwrap()
            })
        })
        .collect();

    for outcome in handles.into_iter().map(|h| h.join().unwrap()) {
        match outcome {
            BindOutcome::Reverified(record) => {
                assert_eq!(record.device_id.as_deref(), Some("owner"));
            }
            BindOutcome::Conflict(record) => {
                assert_eq!(record.device_id.as_deref(), Some("owner"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

// Binds to different keys proceed independently.
#[test]
fn distinct_keys_bind_in_parallel() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    for i in 0..8 {
        store.create(None, &format!("k{i}")).unwrap();
    }

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .compare_and_bind(None, &format!("k{i}"), &format!("dev-{i}"), Utc::now())
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(matches!(handle.join().unwrap(), BindOutcome::Bound(_)));
    }
    assert_eq!(store.list_used().unwrap().len(), 8);
}
