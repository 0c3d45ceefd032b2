//! Transaction Manager
//!
//! Runs the seven-step write protocol across the three resources a write
//! touches (Metadata Index, Audit Log, Vector Index) and recovers from a
//! crash between any two of those steps. A marker file under `wal/` is the
//! only state that survives a crash before the Audit Log's `publish` call
//! runs, since the Index transaction and the in-memory Vector Index tail
//! insert are both rolled back by the crash itself.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditError, AuditLog};
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::error::MemoryError;
use crate::integrity::IntegrityChecker;
use crate::record::Record;
use crate::storage::{MetadataStore, StorageError};
use crate::vector::{VectorIndex, VectorSearchError};

/// Errors internal to the write protocol, before translation to
/// [`MemoryError::TransactionFailed`] at the Memory API boundary.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Audit Log failure at any step.
    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),
    /// Metadata Index failure at any step.
    #[error("metadata index error: {0}")]
    Storage(#[from] StorageError),
    /// Vector Index failure at any step.
    #[error("vector index error: {0}")]
    Vector(#[from] VectorSearchError),
    /// Re-embedding a marker's searchable text during recovery failed.
    #[error("embedding error during recovery: {0}")]
    Embedding(#[from] EmbeddingError),
    /// WAL marker file could not be read or written.
    #[error("wal marker io error: {0}")]
    Io(#[from] std::io::Error),
    /// A WAL marker on disk did not parse.
    #[error("corrupt wal marker {0}: {1}")]
    CorruptMarker(String, String),
}

/// Any internal transaction failure surfaces at the Memory API boundary as
/// [`MemoryError::TransactionFailed`]; the detail string carries the cause
/// since [`TransactionError`] is not itself part of the public API.
impl From<TransactionError> for MemoryError {
    fn from(err: TransactionError) -> Self {
        MemoryError::TransactionFailed(err.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    txn_id: String,
    record_id: String,
    commit_ref: String,
    /// Title + rationale, kept so a crash-recovered write can re-embed
    /// without needing the original caller's in-memory vector: embeddings
    /// are never persisted in the Audit Log body.
    searchable_text: String,
}

/// Coordinates a single logical write across the Index, Log, and Vector
/// Index, and replays any marker left behind by a crash on the next open.
pub struct Coordinator<'a> {
    store: &'a MetadataStore,
    audit: &'a AuditLog,
    vector: &'a Mutex<VectorIndex>,
    vector_path: PathBuf,
    wal_dir: PathBuf,
}

impl<'a> Coordinator<'a> {
    /// Construct a coordinator over already-open resources, creating
    /// `wal_dir` if it does not exist.
    pub fn new(
        store: &'a MetadataStore,
        audit: &'a AuditLog,
        vector: &'a Mutex<VectorIndex>,
        vector_path: PathBuf,
        wal_dir: PathBuf,
    ) -> Result<Self, TransactionError> {
        std::fs::create_dir_all(&wal_dir)?;
        Ok(Self { store, audit, vector, vector_path, wal_dir })
    }

    fn marker_path(&self, txn_id: &str) -> PathBuf {
        self.wal_dir.join(format!("{txn_id}.marker"))
    }

    fn write_marker(&self, marker: &Marker) -> Result<(), TransactionError> {
        let body = serde_json::to_string(marker)
            .map_err(|e| TransactionError::CorruptMarker(marker.txn_id.clone(), e.to_string()))?;
        std::fs::write(self.marker_path(&marker.txn_id), body)?;
        Ok(())
    }

    fn remove_marker(&self, txn_id: &str) -> Result<(), TransactionError> {
        match std::fs::remove_file(self.marker_path(txn_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Run the seven-step write protocol for `record`, embedding `embedding`
    /// into the Vector Index under the same id. Checked against I1-I7 via
    /// `checker` before anything is staged.
    ///
    /// 1. acquire the Audit Log's advisory lock
    /// 2. `MetadataStore::begin`
    /// 3. `IntegrityChecker::check_write`
    /// 4. stage the commit body in the Audit Log (object written, HEAD untouched)
    /// 5. stage the vector into the in-memory tail
    /// 6. publish the commit (point of no return), commit the Index txn, persist the Vector Index
    /// 7. release the lock (by drop) after removing the WAL marker
    pub fn run_write(
        &self,
        checker: &IntegrityChecker<'_>,
        record: &Record,
        embedding: Option<&[f32]>,
    ) -> Result<(), MemoryError> {
        let _lock = self.audit.lock()?;

        checker.check_write(record)?;

        let txn = self.store.begin()?;

        let commit_ref = self.audit.stage(record)?;

        if let Some(vector) = embedding {
            let mut index = self.vector.lock().expect("vector index lock poisoned");
            index.add(&record.id, vector)?;
        }

        let txn_id = uuid::Uuid::new_v4().to_string();
        self.write_marker(&Marker {
            txn_id: txn_id.clone(),
            record_id: record.id.clone(),
            commit_ref: commit_ref.clone(),
            searchable_text: format!("{}\n{}", record.title, record.rationale),
        })?;

        self.audit.publish(&commit_ref)?;
        self.store.upsert(&txn, record)?;
        txn.commit()?;
        {
            let index = self.vector.lock().expect("vector index lock poisoned");
            index.save(&self.vector_path)?;
        }

        self.remove_marker(&txn_id)?;
        Ok(())
    }

    /// Scan `wal/` for markers left by a crash and reconcile each one: if
    /// its commit was published, finish applying the Index write and the
    /// Vector Index insert (re-embedding `searchable_text`, since the
    /// in-memory vector did not survive the crash) and persist; if it was
    /// never published, discard the marker, since nothing downstream ever
    /// observed that write. Returns the number of markers reconciled.
    pub fn recover(&self, embedder: &dyn EmbeddingProvider) -> Result<usize, MemoryError> {
        let mut reconciled = 0;
        let entries = match std::fs::read_dir(&self.wal_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(TransactionError::Io(e).into()),
        };

        for entry in entries {
            let entry = entry.map_err(TransactionError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("marker") {
                continue;
            }

            let body = std::fs::read_to_string(&path).map_err(TransactionError::Io)?;
            let marker: Marker = serde_json::from_str(&body).map_err(|e| {
                TransactionError::CorruptMarker(path.display().to_string(), e.to_string())
            })?;

            if self.audit.is_published(&marker.commit_ref)? {
                let commit = self.audit.read_commit(&marker.commit_ref)?;
                let txn = self.store.begin()?;
                self.store.upsert(&txn, &commit.record)?;
                txn.commit()?;

                let vector = embedder.embed(&marker.searchable_text)?;
                {
                    let mut index = self.vector.lock().expect("vector index lock poisoned");
                    index.add(&marker.record_id, &vector)?;
                    index.save(&self.vector_path)?;
                }
                reconciled += 1;
            }

            self.remove_marker(&marker.txn_id)?;
        }

        Ok(reconciled)
    }
}
