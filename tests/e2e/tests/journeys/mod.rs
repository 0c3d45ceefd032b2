//! End-to-end smoke journey: the full golden path through a single
//! `MemoryStore` in one sitting. Scenario-specific journeys (proposal
//! acceptance, concurrent writers, crash recovery) live in their own test
//! binaries alongside this one.

use ledgermind_core::record::{Authority, SearchMode};
use ledgermind_e2e_tests::harness::TestLedgerManager;

#[test]
fn full_golden_path_record_supersede_event_search() {
    let manager = TestLedgerManager::new_temp();

    let first_id = manager
        .store
        .record_decision(
            "Use PostgreSQL",
            "storage",
            "need ACID guarantees for the ledger tables",
            vec!["requires an ops runbook update".to_string()],
            Authority::Agent,
        )
        .expect("initial decision should be recorded");

    let event_id = manager
        .store
        .record_event(
            "did PostgreSQL hold up under the migration load test?",
            "yes, p99 write latency stayed under 20ms",
            true,
        )
        .expect("event should be recorded");
    manager
        .store
        .link_evidence(&event_id, "storage")
        .expect("evidence should link to the active record");

    let second_id = manager
        .store
        .supersede_decision(
            "Use CockroachDB",
            "storage",
            "need to scale writes horizontally across regions",
            &[first_id.clone()],
            vec![],
            Authority::Agent,
        )
        .expect("supersession should succeed");

    let strict = manager
        .store
        .search_decisions("storage decision", 5, SearchMode::Strict)
        .expect("search should succeed");
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].id, second_id);

    let audit = manager
        .store
        .search_decisions("storage decision", 5, SearchMode::Audit)
        .expect("audit search should succeed");
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().any(|r| r.id == first_id));
    assert!(audit.iter().any(|r| r.id == second_id));
}

#[test]
fn register_target_alias_lets_a_shorthand_resolve_to_the_canonical_target() {
    let manager = TestLedgerManager::new_temp();
    manager
        .store
        .register_target_alias("db", "storage")
        .expect("alias registration should succeed");

    manager
        .store
        .record_decision("Use PostgreSQL", "db", "need ACID guarantees", vec![], Authority::Agent)
        .expect("decision under the alias should be recorded");

    let err = manager
        .store
        .record_decision("Use MySQL", "storage", "conflicting canonical write", vec![], Authority::Agent)
        .unwrap_err();
    assert!(matches!(err, ledgermind_core::error::MemoryError::ConflictError { .. }));
}
