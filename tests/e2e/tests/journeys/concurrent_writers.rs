//! Concurrent writers to distinct targets: two threads race to record a
//! decision each, through a store shared via `Arc<MemoryStore>`, and both
//! must end up `active` with nothing corrupted in the Metadata Index.

use std::sync::Arc;
use std::thread;

use ledgermind_core::record::{Authority, SearchMode};
use ledgermind_e2e_tests::harness::TestLedgerManager;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn memory_store_is_send_and_sync() {
    assert_send_sync::<ledgermind_core::MemoryStore>();
}

#[test]
fn two_threads_writing_distinct_targets_both_succeed() {
    let manager = TestLedgerManager::new_temp();
    let store = Arc::new(manager.store);

    let store_a = Arc::clone(&store);
    let writer_a = thread::spawn(move || {
        store_a.record_decision(
            "Use PostgreSQL",
            "storage",
            "need ACID guarantees for the ledger tables",
            vec![],
            Authority::Agent,
        )
    });

    let store_b = Arc::clone(&store);
    let writer_b = thread::spawn(move || {
        store_b.record_decision(
            "Use Redis for session cache",
            "caching",
            "need sub-millisecond session lookups",
            vec![],
            Authority::Agent,
        )
    });

    let id_a = writer_a.join().expect("writer thread A should not panic").expect("write A should succeed");
    let id_b = writer_b.join().expect("writer thread B should not panic").expect("write B should succeed");
    assert_ne!(id_a, id_b);

    let results = store.search_decisions("decision", 10, SearchMode::Strict).expect("search should succeed");
    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|r| r.id == id_a));
    assert!(results.iter().any(|r| r.id == id_b));
}

/// Many concurrent writers hammering distinct targets never corrupt I1: each
/// target ends up with exactly one active record, no duplicates and none
/// dropped.
#[test]
fn many_concurrent_writers_each_keep_their_own_target_active() {
    let manager = TestLedgerManager::new_temp();
    let store = Arc::new(manager.store);
    const WRITER_COUNT: usize = 8;

    let handles: Vec<_> = (0..WRITER_COUNT)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store.record_decision(
                    format!("Decision {i}"),
                    format!("target-{i}"),
                    "seeded concurrently across many writer threads",
                    vec![],
                    Authority::Agent,
                )
            })
        })
        .collect();

    let ids: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread should not panic").expect("write should succeed"))
        .collect();

    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), WRITER_COUNT, "every writer must produce a distinct record id");

    let results = store.search_decisions("decision", WRITER_COUNT * 2, SearchMode::Strict).expect("search should succeed");
    assert_eq!(results.len(), WRITER_COUNT);
}
