//! Audit Log — append-only, content-addressed store of record bodies
//!
//! Exclusively owns immutable content bodies; the Metadata Index may always
//! be rebuilt from the log via [`AuditLog::replay`]. Modeled as a commit
//! graph the way a content-addressed version control object store is, kept
//! to this domain's actual needs (no trees, no blobs split apart from
//! commits — one commit carries one record body).

mod lock;
mod log;

pub use lock::FileLock;
pub use log::{AuditLog, Commit, SyncReport};

/// Errors raised by the audit log.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Underlying filesystem I/O failure.
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),
    /// The lock could not be acquired within the retry budget.
    #[error("could not acquire audit log lock")]
    LockContention,
    /// A referenced commit object does not exist.
    #[error("commit not found: {0}")]
    CommitNotFound(String),
    /// The record body could not be parsed back from its on-disk format.
    #[error("malformed record body in commit {0}: {1}")]
    MalformedBody(String, String),
    /// Reconciling the index against the log hit a metadata index failure.
    #[error("metadata index error during sync_index: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
