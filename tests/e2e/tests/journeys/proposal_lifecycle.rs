//! Literal scenario: a proposal is recorded, acceptance is rejected while
//! the review window is still open, then accepted once it has elapsed.
//!
//! `min_evidence` is set to 0 for this store: `link_evidence` attaches
//! events to a target's *active* record, and a pending proposal is never
//! active, so there is no public path to grow a proposal's own evidence
//! count before acceptance. I6 is exercised separately, at the unit level,
//! against a directly constructed record.

use std::thread::sleep;
use std::time::Duration;

use ledgermind_core::config::Config;
use ledgermind_core::error::MemoryError;
use ledgermind_core::record::{Authority, SearchMode, Status};
use ledgermind_e2e_tests::harness::TestLedgerManager;

fn short_review_window_config() -> Config {
    Config {
        review_window_seconds: 1,
        min_evidence: 0,
        cooldown_seconds: 0,
        relevance_threshold: 0.0,
        ..Config::default()
    }
}

#[test]
fn accept_proposal_before_review_window_elapses_is_rejected() {
    let manager = TestLedgerManager::new_temp_with_config(short_review_window_config());
    let proposal_id = manager
        .store
        .record_proposal(
            "Adopt read replicas",
            "reporting",
            "reduce read latency for the reporting path",
            vec![],
            Authority::Agent,
        )
        .expect("proposal should be recorded");

    let err = manager.store.accept_proposal(&proposal_id).unwrap_err();
    assert!(matches!(err, MemoryError::ReviewWindowPending { .. }));
}

#[test]
fn accept_proposal_after_review_window_mints_decision_superseding_the_proposal() {
    let manager = TestLedgerManager::new_temp_with_config(short_review_window_config());
    let proposal_id = manager
        .store
        .record_proposal(
            "Adopt read replicas",
            "reporting",
            "reduce read latency for the reporting path",
            vec![],
            Authority::Agent,
        )
        .expect("proposal should be recorded");

    sleep(Duration::from_millis(1100));

    let decision_id = manager
        .store
        .accept_proposal(&proposal_id)
        .expect("acceptance should succeed once the review window has elapsed");
    assert_ne!(decision_id, proposal_id);

    let active = manager
        .store
        .search_decisions("read replicas", 5, SearchMode::Strict)
        .expect("search should succeed");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, decision_id);
    assert_eq!(active[0].status, Status::Active);

    let audit = manager
        .store
        .search_decisions("read replicas", 5, SearchMode::Audit)
        .expect("audit search should succeed");
    let retired_proposal = audit
        .iter()
        .find(|r| r.id == proposal_id)
        .expect("the original proposal id is still present in the audit trail");
    assert_eq!(retired_proposal.status, Status::Superseded);
}

#[test]
fn accepting_an_already_accepted_proposal_fails() {
    let manager = TestLedgerManager::new_temp_with_config(short_review_window_config());
    let proposal_id = manager
        .store
        .record_proposal("Adopt read replicas", "reporting", "reduce read latency for the reporting path", vec![], Authority::Agent)
        .expect("proposal should be recorded");

    sleep(Duration::from_millis(1100));
    manager.store.accept_proposal(&proposal_id).expect("first acceptance should succeed");

    let err = manager.store.accept_proposal(&proposal_id).unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}
