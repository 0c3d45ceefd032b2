//! Resolution Engine tests against a live `MemoryStore`.

use ledgermind_core::record::{Authority, SearchMode};
use ledgermind_e2e_tests::harness::TestLedgerManager;
use ledgermind_e2e_tests::mocks::TestDataFactory;

/// A self-active record resolves to itself when queried in `audit` mode
/// (no `truth_id`, since it was not replaced by anything).
#[test]
fn active_record_is_its_own_truth() {
    let manager = TestLedgerManager::new_temp();
    let id = TestDataFactory::seed_storage_decision(&manager.store);

    let results = manager.store.search_decisions("postgres", 5, SearchMode::Audit).unwrap();
    let hit = results.iter().find(|r| r.id == id).expect("active record must be findable");
    assert!(hit.truth_id.is_none());
}

/// Resolving a two-hop supersession chain in `balanced` mode returns the
/// newest record, not an intermediate one.
#[test]
fn two_hop_chain_resolves_to_newest_in_balanced_mode() {
    let manager = TestLedgerManager::new_temp();
    let chain = TestDataFactory::seed_supersession_chain(&manager.store, "storage");

    let results = manager.store.search_decisions("approach", 10, SearchMode::Balanced).unwrap();
    assert_eq!(results.len(), 1, "balanced mode dedupes the whole chain to one target");
    assert_eq!(results[0].id, chain.newest);
}

/// `search(..., strict)` only ever surfaces `status = active` records, so a
/// superseded intermediate in a chain never appears even transiently.
#[test]
fn strict_mode_never_returns_superseded_records() {
    let manager = TestLedgerManager::new_temp();
    let chain = TestDataFactory::seed_supersession_chain(&manager.store, "storage");

    let results = manager.store.search_decisions("approach", 10, SearchMode::Strict).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, chain.newest);
    assert_ne!(results[0].id, chain.oldest);
    assert_ne!(results[0].id, chain.middle);
}

/// Audit mode returns every record in the chain with no resolution applied,
/// so history is fully visible.
#[test]
fn audit_mode_surfaces_every_record_in_a_chain() {
    let manager = TestLedgerManager::new_temp();
    let _chain = TestDataFactory::seed_supersession_chain(&manager.store, "storage");

    let results = manager.store.search_decisions("approach", 10, SearchMode::Audit).unwrap();
    assert_eq!(results.len(), 3, "audit mode keeps every record, no dedup");
}

/// Literal scenario: record then supersede, confirming the old record
/// becomes non-authoritative while the new one takes over the target.
#[test]
fn record_then_supersede_flips_authoritative_record() {
    let manager = TestLedgerManager::new_temp();
    let old_id = TestDataFactory::seed_storage_decision(&manager.store);
    let new_id = TestDataFactory::supersede_storage_decision(&manager.store, &old_id);

    let strict = manager.store.search_decisions("database", 5, SearchMode::Strict).unwrap();
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].id, new_id);

    let balanced = manager.store.search_decisions("cockroach", 5, SearchMode::Balanced).unwrap();
    assert_eq!(balanced.len(), 1);
    assert_eq!(balanced[0].id, new_id);
}

/// I3 is enforced at the write boundary: an attempted agent-over-human
/// supersession leaves the target's active record untouched.
#[test]
fn blocked_supersession_leaves_active_record_unchanged() {
    let manager = TestLedgerManager::new_temp();
    let human_id = manager.seed_decision("storage", Authority::Human);

    let err = manager.store.supersede_decision(
        "Use CockroachDB",
        "storage",
        "scale horizontally safely",
        &[human_id.clone()],
        vec![],
        Authority::Agent,
    );
    assert!(err.is_err());

    let results = manager.store.search_decisions("decision", 5, SearchMode::Strict).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, human_id);
}
