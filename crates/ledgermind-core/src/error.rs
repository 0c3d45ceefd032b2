//! Top-level error taxonomy
//!
//! Every component error type converts into [`MemoryError`] at the Memory API
//! boundary via `#[from]`. Invariant failures are surfaced, never retried;
//! lock contention is retried internally before surfacing.

use crate::audit::AuditError;
use crate::embeddings::EmbeddingError;
use crate::record::Authority;
use crate::storage::StorageError;
use crate::vector::VectorSearchError;

/// Invariant codes I1-I7, see the data model for the rule each one enforces.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantCode {
    /// I1: at most one active record per target.
    SingleActivePerTarget,
    /// I2: rationale length floor (10 chars, 15 when superseding).
    RationaleLength,
    /// I3: an agent-authored record may not supersede a human-authored one.
    AuthorityIsolation,
    /// I4: supersession edges must form a DAG.
    Dag,
    /// I5: acceptance must occur strictly after the proposal's review window.
    ReviewWindow,
    /// I6: acceptance requires at least `min_evidence` linked events.
    EvidenceThreshold,
    /// I7: stored targets must equal their own normalization.
    TargetNormalization,
}

impl std::fmt::Display for InvariantCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            InvariantCode::SingleActivePerTarget => "I1",
            InvariantCode::RationaleLength => "I2",
            InvariantCode::AuthorityIsolation => "I3",
            InvariantCode::Dag => "I4",
            InvariantCode::ReviewWindow => "I5",
            InvariantCode::EvidenceThreshold => "I6",
            InvariantCode::TargetNormalization => "I7",
        };
        write!(f, "{code}")
    }
}

/// Top-level error type surfaced at the Memory API boundary.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Rejected before commit; no side effects took place.
    #[error("invariant {code} violated: {detail}")]
    InvariantViolation {
        /// Which of I1-I7 failed.
        code: InvariantCode,
        /// Human-readable detail for logging/diagnostics.
        detail: String,
    },

    /// Existing active record for target; caller must supersede explicitly.
    #[error("an active record already exists for target {target:?}")]
    ConflictError {
        /// The target that already has an active record.
        target: String,
    },

    /// Supersession walk found a cycle.
    #[error("cycle detected while resolving supersession chain from {start_id}")]
    CycleDetected {
        /// The record id the walk started from.
        start_id: String,
    },

    /// The audit log's advisory lock could not be acquired within the retry budget.
    #[error("could not acquire audit log lock after retry budget exhausted")]
    LockContention,

    /// The requested id is absent from the index.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Authority/isolation rule violated (I3).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// I5: acceptance attempted before the review window elapsed.
    #[error("review window still pending, resolves at {resolves_at}")]
    ReviewWindowPending {
        /// UTC epoch ms at which the window elapses.
        resolves_at: i64,
    },

    /// I/O or storage error; rollback was run to completion.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Startup detected a half-applied commit; caller must retry after recovery.
    #[error("recovery pending for marker {marker_id}, retry after it completes")]
    RecoveryPending {
        /// Id of the pending recovery marker.
        marker_id: String,
    },

    /// The edge-level per-authority write cooldown is still active.
    #[error("authority {authority} must wait {retry_after_ms}ms before writing again")]
    CooldownActive {
        /// The authority whose cooldown has not yet elapsed.
        authority: Authority,
        /// Milliseconds remaining before the next write from this authority
        /// is accepted.
        retry_after_ms: i64,
    },

    /// Underlying metadata index failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Underlying audit log failure.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Underlying vector index failure.
    #[error(transparent)]
    Vector(#[from] VectorSearchError),

    /// Underlying embedding provider failure.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;
