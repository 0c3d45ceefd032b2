//! Literal end-to-end scenarios 1-3 from the spec's testable-properties
//! section: record a decision, supersede it, and confirm resolution and
//! search behave exactly as scripted, including the authority-isolation
//! rejection on scenario 3.

use ledgermind_core::error::{InvariantCode, MemoryError};
use ledgermind_core::record::{Authority, SearchMode};
use ledgermind_e2e_tests::harness::TestLedgerManager;
use ledgermind_e2e_tests::mocks::fixtures::TestDataFactory;

/// Scenario 1: a single active decision for `storage`; I1 holds, and a
/// strict search for "database" returns exactly this one record.
#[test]
fn scenario_one_record_decision_is_active_and_findable() {
    let manager = TestLedgerManager::new_temp();
    let id = TestDataFactory::seed_storage_decision(&manager.store);

    let results = manager
        .store
        .search_decisions("database", 5, SearchMode::Strict)
        .expect("search should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, id);
    assert_eq!(results[0].status, ledgermind_core::record::Status::Active);
}

/// Scenario 2: superseding `storage` retires the old id, `resolve(old_id)`
/// (via a search's `truth_id`) lands on the new id, and a balanced search
/// for "postgres" surfaces only the new record.
#[test]
fn scenario_two_supersede_retires_old_and_resolves_to_new() {
    let manager = TestLedgerManager::new_temp();
    let old_id = TestDataFactory::seed_storage_decision(&manager.store);
    let new_id = TestDataFactory::supersede_storage_decision(&manager.store, &old_id);

    assert_ne!(old_id, new_id);

    let audit = manager
        .store
        .search_decisions("postgres", 10, SearchMode::Audit)
        .expect("audit search should succeed");
    let old_result = audit.iter().find(|r| r.id == old_id).expect("old id still visible in audit mode");
    assert_eq!(old_result.status, ledgermind_core::record::Status::Superseded);
    assert_eq!(
        old_result.truth_id.as_deref(),
        Some(new_id.as_str()),
        "resolving the superseded id should land on the new active record"
    );

    let balanced = manager
        .store
        .search_decisions("postgres", 10, SearchMode::Balanced)
        .expect("balanced search should succeed");
    assert_eq!(balanced.len(), 1, "balanced mode dedups by target down to one record");
    assert_eq!(balanced[0].id, new_id);
}

/// Scenario 3: an agent may not supersede a human-authored record — I3
/// rejects the attempt before any state changes, and the human record stays
/// active and unsupersede.
#[test]
fn scenario_three_agent_cannot_supersede_human_record_no_state_change() {
    let manager = TestLedgerManager::new_temp();
    let human_id = manager
        .store
        .record_decision(
            "Use PostgreSQL",
            "storage",
            "need ACID guarantees",
            vec![],
            Authority::Human,
        )
        .expect("human decision should be recorded");

    let err = manager
        .store
        .supersede_decision(
            "Use CockroachDB",
            "storage",
            "scale horizontally safely",
            &[human_id.clone()],
            vec![],
            Authority::Agent,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        MemoryError::InvariantViolation { code: InvariantCode::AuthorityIsolation, .. }
    ));

    let results = manager
        .store
        .search_decisions("postgres", 5, SearchMode::Strict)
        .expect("search should succeed");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, human_id, "the human record must remain the sole active record");
    assert_eq!(results[0].status, ledgermind_core::record::Status::Active);
}
