//! Simulates a crash right after a commit is published but before the
//! Metadata Index upsert and Vector Index insert applied: stages and
//! publishes a commit directly through the Audit Log, hand-writes the WAL
//! marker `Coordinator::run_write` would have left behind, then opens a
//! fresh `MemoryStore` at the same path and confirms `open()`'s recovery
//! pass finishes the write before any caller touches the store.

use ledgermind_core::audit::AuditLog;
use ledgermind_core::config::Config;
use ledgermind_core::embeddings::MockEmbedder;
use ledgermind_core::record::{Authority, Kind, Record, SearchMode};
use ledgermind_core::MemoryStore;
use serde_json::json;
use tempfile::TempDir;

/// Mirrors the private `transaction::Marker` shape: field names are not
/// renamed by serde, so this JSON must use the same identifiers.
fn marker_json(txn_id: &str, record_id: &str, commit_ref: &str, searchable_text: &str) -> String {
    json!({
        "txn_id": txn_id,
        "record_id": record_id,
        "commit_ref": commit_ref,
        "searchable_text": searchable_text,
    })
    .to_string()
}

#[test]
fn open_recovers_a_published_commit_left_behind_by_a_crash() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let storage_path = temp_dir.path().join("ledgermind-crash-test");
    std::fs::create_dir_all(&storage_path).expect("failed to create storage root");

    let record = Record::new(
        Kind::Decision,
        "Use PostgreSQL",
        "storage",
        "need ACID guarantees for the ledger tables",
        vec![],
        Authority::Agent,
    );

    // Stage and publish directly through the Audit Log, bypassing the
    // Coordinator entirely, as a crash between "publish" and "upsert" would
    // leave things.
    let audit = AuditLog::open(storage_path.join("semantic")).expect("audit log should open");
    let commit_ref = audit.stage(&record).expect("stage should succeed");
    audit.publish(&commit_ref).expect("publish should succeed");
    drop(audit);

    let wal_dir = storage_path.join("wal");
    std::fs::create_dir_all(&wal_dir).expect("failed to create wal dir");
    let txn_id = "crash-test-txn";
    let searchable_text = format!("{}\n{}", record.title, record.rationale);
    std::fs::write(
        wal_dir.join(format!("{txn_id}.marker")),
        marker_json(txn_id, &record.id, &commit_ref, &searchable_text),
    )
    .expect("failed to write wal marker");

    // Before MemoryStore::open runs, the record is published in the log but
    // invisible to every read path a caller would use.
    let store = MemoryStore::open(
        storage_path.clone(),
        Box::new(MockEmbedder::new(ledgermind_core::vector::DEFAULT_DIMENSIONS)),
        Config {
            cooldown_seconds: 0,
            relevance_threshold: 0.0,
            ..Config::default()
        },
    )
    .expect("open should recover the half-applied commit");

    let results = store
        .search_decisions("storage decision", 5, SearchMode::Strict)
        .expect("search should succeed after recovery");
    assert!(
        results.iter().any(|r| r.id == record.id),
        "recovered record must be queryable immediately after open"
    );

    assert_eq!(
        std::fs::read_dir(&wal_dir).expect("wal dir should still exist").count(),
        0,
        "the marker must be removed once recovery reconciles it"
    );
}

#[test]
fn open_discards_a_marker_for_a_commit_that_was_never_published() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let storage_path = temp_dir.path().join("ledgermind-crash-test-unpublished");
    std::fs::create_dir_all(&storage_path).expect("failed to create storage root");

    let record = Record::new(
        Kind::Decision,
        "Use PostgreSQL",
        "storage",
        "need ACID guarantees for the ledger tables",
        vec![],
        Authority::Agent,
    );

    let audit = AuditLog::open(storage_path.join("semantic")).expect("audit log should open");
    let commit_ref = audit.stage(&record).expect("stage should succeed");
    // Deliberately skip `publish`: this simulates a crash before step 6 of
    // the write protocol ever ran.
    drop(audit);

    let wal_dir = storage_path.join("wal");
    std::fs::create_dir_all(&wal_dir).expect("failed to create wal dir");
    let txn_id = "crash-test-txn-unpublished";
    let searchable_text = format!("{}\n{}", record.title, record.rationale);
    std::fs::write(
        wal_dir.join(format!("{txn_id}.marker")),
        marker_json(txn_id, &record.id, &commit_ref, &searchable_text),
    )
    .expect("failed to write wal marker");

    let store = MemoryStore::open(
        storage_path.clone(),
        Box::new(MockEmbedder::new(ledgermind_core::vector::DEFAULT_DIMENSIONS)),
        Config {
            cooldown_seconds: 0,
            relevance_threshold: 0.0,
            ..Config::default()
        },
    )
    .expect("open should discard the orphaned marker without error");

    let results = store
        .search_decisions("storage decision", 5, SearchMode::Audit)
        .expect("search should succeed");
    assert!(
        !results.iter().any(|r| r.id == record.id),
        "a never-published commit must not surface after recovery"
    );

    assert_eq!(
        std::fs::read_dir(&wal_dir).expect("wal dir should still exist").count(),
        0,
        "the orphaned marker must still be cleaned up"
    );
}
