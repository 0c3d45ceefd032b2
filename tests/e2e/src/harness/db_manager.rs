//! Test Ledger Manager
//!
//! Provides isolated `MemoryStore` instances for testing:
//! - Temporary stores that are automatically cleaned up
//! - Seeding helpers for decisions, proposals, and evidence
//! - Concurrent test isolation (each manager owns its own `storage_path`)

use ledgermind_core::config::Config;
use ledgermind_core::embeddings::MockEmbedder;
use ledgermind_core::record::Authority;
use ledgermind_core::MemoryStore;
use std::path::PathBuf;
use tempfile::TempDir;

/// Manager for test stores.
///
/// Creates an isolated `MemoryStore` rooted at its own temp directory so
/// concurrent tests never interfere. The temp directory is deleted when the
/// manager is dropped.
pub struct TestLedgerManager {
    /// The store under test.
    pub store: MemoryStore,
    /// Kept alive so the directory isn't deleted prematurely.
    _temp_dir: Option<TempDir>,
    storage_path: PathBuf,
}

/// Test-friendly defaults: no write cooldown (tests fire many writes from
/// the same authority back to back) and no relevance floor (the mock
/// embedder's hash-based vectors carry no real semantic signal, so a
/// nonzero threshold would make unrelated query text filter out records a
/// real embedding model would have matched).
fn test_config() -> Config {
    Config {
        cooldown_seconds: 0,
        relevance_threshold: 0.0,
        ..Config::default()
    }
}

impl TestLedgerManager {
    /// Create a new store in a fresh temp directory, using the mock
    /// embedder and test-friendly config (see [`test_config`]).
    pub fn new_temp() -> Self {
        Self::new_temp_with_config(test_config())
    }

    /// Create a new store in a fresh temp directory with a custom config
    /// (useful for shrinking `review_window_seconds`/`cooldown_seconds` in
    /// tests that would otherwise need to sleep for real wall-clock time).
    pub fn new_temp_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let storage_path = temp_dir.path().join("ledgermind-test");
        let store = MemoryStore::open(
            storage_path.clone(),
            Box::new(MockEmbedder::new(ledgermind_core::vector::DEFAULT_DIMENSIONS)),
            config,
        )
        .expect("failed to open test store");

        Self {
            store,
            _temp_dir: Some(temp_dir),
            storage_path,
        }
    }

    /// Re-open a store rooted at the same path, as a fresh process would
    /// after a crash: runs `MemoryStore::open`'s recovery pass again.
    pub fn reopen(self) -> Self {
        let storage_path = self.storage_path.clone();
        let temp_dir = self._temp_dir;
        drop(self.store);

        let store = MemoryStore::open(
            storage_path.clone(),
            Box::new(MockEmbedder::new(ledgermind_core::vector::DEFAULT_DIMENSIONS)),
            test_config(),
        )
        .expect("failed to reopen test store");

        Self {
            store,
            _temp_dir: temp_dir,
            storage_path,
        }
    }

    /// The on-disk root this store was opened at.
    pub fn path(&self) -> &PathBuf {
        &self.storage_path
    }

    /// Seed `count` unrelated active decisions, one target each, returning
    /// their ids.
    pub fn seed_decisions(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                self.store
                    .record_decision(
                        format!("Decision {i}"),
                        &format!("target-{i}"),
                        "seeded for test setup, not a real decision",
                        vec![],
                        Authority::Agent,
                    )
                    .expect("seed decision should succeed")
            })
            .collect()
    }

    /// Seed a single active decision for `target`, returning its id.
    pub fn seed_decision(&self, target: &str, authority: Authority) -> String {
        self.store
            .record_decision(
                format!("Decision for {target}"),
                target,
                "seeded for test setup, not a real decision",
                vec![],
                authority,
            )
            .expect("seed decision should succeed")
    }

    /// Seed a pending proposal for `target`, returning its id.
    pub fn seed_proposal(&self, target: &str, authority: Authority) -> String {
        self.store
            .record_proposal(
                format!("Proposal for {target}"),
                target,
                "seeded proposal awaiting review and acceptance",
                vec![],
                authority,
            )
            .expect("seed proposal should succeed")
    }

    /// Seed one episodic event and link it as evidence for `target`'s
    /// current active record.
    pub fn seed_evidence(&self, target: &str) -> String {
        let event_id = self
            .store
            .record_event("did the approach work?", "yes, validated in staging", true)
            .expect("seed event should succeed");
        self.store
            .link_evidence(&event_id, target)
            .expect("link_evidence should succeed");
        event_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_temp_store_opens_clean() {
        let manager = TestLedgerManager::new_temp();
        assert!(manager.path().parent().unwrap().exists());
    }

    #[test]
    fn seed_decisions_creates_distinct_active_records() {
        let manager = TestLedgerManager::new_temp();
        let ids = manager.seed_decisions(3);
        assert_eq!(ids.len(), 3);
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn reopen_preserves_previously_written_decisions() {
        let manager = TestLedgerManager::new_temp();
        let id = manager.seed_decision("storage", Authority::Agent);
        let manager = manager.reopen();
        let fetched = manager
            .store
            .search_decisions("storage", 5, ledgermind_core::record::SearchMode::Audit)
            .expect("search should succeed");
        assert!(fetched.iter().any(|r| r.id == id));
    }
}
