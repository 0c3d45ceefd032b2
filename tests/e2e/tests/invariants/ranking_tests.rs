//! Ranking Engine behavior against a live `MemoryStore`.
//!
//! These exercise count- and set-membership-level properties of each mode
//! rather than exact score ordering: the mock embedder's hash-based vectors
//! carry no real semantic signal, so asserting a strict rank order between
//! two differently-worded records would be testing the mock, not the
//! Ranking Engine's bonus formula (which is covered precisely by
//! `ledgermind-core`'s own unit tests against constructed candidates).

use ledgermind_core::config::Config;
use ledgermind_core::record::{Authority, SearchMode};
use ledgermind_e2e_tests::harness::TestLedgerManager;

/// `strict` keeps only `active` records: a superseded chain link is excluded
/// even though it is still a perfectly good vector match.
#[test]
fn strict_mode_excludes_non_active_records() {
    let manager = TestLedgerManager::new_temp();
    let old = manager.seed_decision("storage", Authority::Agent);
    manager
        .store
        .supersede_decision("Newer", "storage", "revised after initial feedback", &[old], vec![], Authority::Agent)
        .unwrap();

    let results = manager.store.search_decisions("decision", 10, SearchMode::Strict).unwrap();
    assert!(results.iter().all(|r| r.status == ledgermind_core::record::Status::Active));
}

/// `balanced` returns at most one record per target, regardless of how many
/// records in its supersession history would otherwise match.
#[test]
fn balanced_mode_returns_at_most_one_per_target() {
    let manager = TestLedgerManager::new_temp();
    let targets = ["alpha", "beta", "gamma"];
    for target in targets {
        let old = manager.seed_decision(target, Authority::Agent);
        manager
            .store
            .supersede_decision("Newer", target, "revised after initial feedback", &[old], vec![], Authority::Agent)
            .unwrap();
    }

    let results = manager.store.search_decisions("decision", 20, SearchMode::Balanced).unwrap();
    let mut seen = std::collections::HashSet::new();
    for r in &results {
        assert!(seen.insert(r.target.clone()), "balanced mode must not return two records for the same target");
    }
    assert_eq!(results.len(), targets.len());
}

/// `audit` keeps every record with no dedup, so a two-record chain surfaces
/// both entries.
#[test]
fn audit_mode_keeps_full_history() {
    let manager = TestLedgerManager::new_temp();
    let old = manager.seed_decision("storage", Authority::Agent);
    manager
        .store
        .supersede_decision("Newer", "storage", "revised after initial feedback", &[old], vec![], Authority::Agent)
        .unwrap();

    let results = manager.store.search_decisions("decision", 20, SearchMode::Audit).unwrap();
    assert_eq!(results.len(), 2);
}

/// `limit` is respected regardless of how many candidates survive filtering.
#[test]
fn limit_caps_result_count() {
    let manager = TestLedgerManager::new_temp();
    manager.seed_decisions(10);

    let results = manager.store.search_decisions("decision", 3, SearchMode::Audit).unwrap();
    assert!(results.len() <= 3);
}

/// A `relevance_threshold` above every candidate's actual similarity filters
/// the search down to nothing, proving the filter is applied rather than
/// silently ignored.
#[test]
fn relevance_threshold_filters_out_everything_when_set_to_max() {
    let config = Config {
        cooldown_seconds: 0,
        relevance_threshold: 1.01, // above cosine similarity's [-1, 1] range
        ..Config::default()
    };
    let manager = TestLedgerManager::new_temp_with_config(config);
    manager.seed_decisions(5);

    let results = manager.store.search_decisions("decision", 10, SearchMode::Audit).unwrap();
    assert!(results.is_empty());
}

/// In `audit` mode, no resolution pass runs: every record keeps
/// `truth_id = None`, even a record that was itself superseded, since audit
/// is meant to show raw history rather than resolved truths.
#[test]
fn audit_mode_never_populates_truth_id() {
    let manager = TestLedgerManager::new_temp();
    let old = manager.seed_decision("storage", Authority::Agent);
    manager
        .store
        .supersede_decision("Newer", "storage", "revised after initial feedback", &[old], vec![], Authority::Agent)
        .unwrap();

    let results = manager.store.search_decisions("decision", 10, SearchMode::Audit).unwrap();
    assert!(results.iter().all(|r| r.truth_id.is_none()));
}

/// In `balanced` mode, the surviving record for a target carries no
/// `truth_id` of its own: it IS the resolved truth, so there's nothing to
/// point at.
#[test]
fn balanced_mode_survivor_has_no_truth_id() {
    let manager = TestLedgerManager::new_temp();
    let old = manager.seed_decision("storage", Authority::Agent);
    let new_id = manager
        .store
        .supersede_decision("Newer", "storage", "revised after initial feedback", &[old], vec![], Authority::Agent)
        .unwrap();

    let results = manager.store.search_decisions("decision", 10, SearchMode::Balanced).unwrap();
    let survivor = results.iter().find(|r| r.id == new_id).expect("newest record survives dedup");
    assert!(survivor.truth_id.is_none());
}
