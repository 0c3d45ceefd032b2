//! Integrity Checker
//!
//! Evaluates I1-I7 against the current Metadata Index state and a proposed
//! mutation. Pure relative to Index reads: it never mutates state, and every
//! failure is a typed [`MemoryError`] raised before the Transaction Manager
//! stages anything.

use chrono::{DateTime, Utc};

use crate::error::{InvariantCode, MemoryError};
use crate::record::{normalize, Authority, Record};
use crate::resolution::ResolutionEngine;
use crate::storage::MetadataStore;

/// Result alias used throughout the checker.
pub type Result<T> = std::result::Result<T, MemoryError>;

fn violation(code: InvariantCode, detail: impl Into<String>) -> MemoryError {
    MemoryError::InvariantViolation { code, detail: detail.into() }
}

/// Pure validator of I1-I7 against the current Index state.
pub struct IntegrityChecker<'a> {
    store: &'a MetadataStore,
    max_resolution_depth: u32,
}

impl<'a> IntegrityChecker<'a> {
    /// Construct a checker bound to a Metadata Index.
    pub fn new(store: &'a MetadataStore, max_resolution_depth: u32) -> Self {
        Self { store, max_resolution_depth }
    }

    /// Full pre-commit validation for a fresh write (`record_decision`,
    /// `supersede_decision`, `record_proposal`). Checks I1 (only for records
    /// that will land `active`), I2, I3, I4, and I7.
    pub fn check_write(&self, candidate: &Record) -> Result<()> {
        self.check_target_normalized(&candidate.target)?;
        self.check_rationale_length(candidate)?;

        if candidate.status == crate::record::Status::Active {
            self.check_single_active(&candidate.target, &candidate.id)?;
        }

        for old_id in &candidate.supersedes {
            self.check_authority_isolation(candidate.authority, old_id)?;
            self.check_no_cycle(&candidate.id, old_id)?;
        }

        Ok(())
    }

    /// I1: at most one `active` record per target. The record currently
    /// being written is exempt from its own check.
    fn check_single_active(&self, target: &str, writing_id: &str) -> Result<()> {
        if let Some(existing) = self.store.find_active_by_target(target)? {
            if existing.id != writing_id {
                return Err(MemoryError::ConflictError { target: target.to_string() });
            }
        }
        Ok(())
    }

    /// I2: rationale length floor (10 chars, 15 when superseding), measured
    /// in `char`s so multi-byte UTF-8 text is not penalized.
    fn check_rationale_length(&self, candidate: &Record) -> Result<()> {
        if !candidate.rationale_len_ok() {
            return Err(violation(
                InvariantCode::RationaleLength,
                format!(
                    "rationale has {} chars, needs {}",
                    candidate.rationale.chars().count(),
                    candidate.min_rationale_len()
                ),
            ));
        }
        Ok(())
    }

    /// I3: no agent-authored record may supersede a human-authored one.
    fn check_authority_isolation(&self, new_authority: Authority, old_id: &str) -> Result<()> {
        let old = self.store.get(old_id)?;
        if !ResolutionEngine::authority_allows_supersede(new_authority, old.authority) {
            return Err(violation(
                InvariantCode::AuthorityIsolation,
                format!(
                    "authority {new_authority} may not supersede {} record {old_id}",
                    old.authority
                ),
            ));
        }
        Ok(())
    }

    /// I4: supersession edges must form a DAG. Rejects an edge whose old
    /// side already transitively reaches the new side, per the write-time
    /// enforcement the design notes prefer over walk-time-only detection.
    fn check_no_cycle(&self, new_id: &str, old_id: &str) -> Result<()> {
        if self.store.supersedes_reaches(old_id, new_id, self.max_resolution_depth)? {
            return Err(violation(
                InvariantCode::Dag,
                format!("edge {new_id} -> {old_id} would close a supersession cycle"),
            ));
        }
        Ok(())
    }

    /// I7: every stored target equals its own normalization.
    fn check_target_normalized(&self, target: &str) -> Result<()> {
        if target != normalize(target) {
            return Err(violation(
                InvariantCode::TargetNormalization,
                format!("target {target:?} is not normalized"),
            ));
        }
        Ok(())
    }

    /// I5: `accept_proposal` must occur strictly later than
    /// `created_at + review_window`.
    pub fn check_review_window(
        &self,
        proposal_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
        review_window_seconds: i64,
    ) -> Result<()> {
        let resolves_at = proposal_created_at + chrono::Duration::seconds(review_window_seconds);
        if now <= resolves_at {
            return Err(MemoryError::ReviewWindowPending {
                resolves_at: resolves_at.timestamp_millis(),
            });
        }
        Ok(())
    }

    /// I6: acceptance requires at least `min_evidence` linked events.
    pub fn check_evidence_threshold(&self, evidence_count: usize, min_evidence: usize) -> Result<()> {
        if evidence_count < min_evidence {
            return Err(violation(
                InvariantCode::EvidenceThreshold,
                format!("{evidence_count} linked events, needs {min_evidence}"),
            ));
        }
        Ok(())
    }
}
