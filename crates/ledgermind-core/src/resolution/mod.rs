//! Resolution Engine
//!
//! Walks supersession edges to the current truth, validates a caller's
//! declared supersession intent against what the Integrity Checker actually
//! detected, and enforces I3 independently of the walk that produced the
//! candidate edge (write-time enforcement lives in the Integrity Checker;
//! this is the defense-in-depth copy the design notes call for).

use crate::record::Authority;
use crate::storage::{MetadataStore, Resolution, StorageError};

/// Outcome of `resolve`, naming the truth id plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Truth {
    /// `id` is itself active; it is its own truth.
    SelfActive(String),
    /// The walk reached a different active descendant.
    Resolved(String),
    /// The walk terminated at a non-active record. `truncated` is set when
    /// `max_depth` cut the walk off rather than the chain running out of
    /// edges naturally.
    NoActiveTruth { deepest_id: String, truncated: bool },
    /// A cycle was detected while walking; the data is corrupt or the input
    /// supersession set is malformed.
    CycleDetected,
}

/// Outcome of `validate_intent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentValidation {
    /// `proposed` is a subset of `detected`: the caller declared everything
    /// the Integrity Checker actually found in conflict.
    Valid,
    /// The proposed set is empty while conflicts were detected; the caller
    /// must either declare them or abort.
    Abort,
    /// The proposed set is non-empty but not a subset of what was detected.
    InvalidSubset,
}

/// Walks the supersession graph and validates supersession intent.
pub struct ResolutionEngine<'a> {
    store: &'a MetadataStore,
    max_depth: u32,
}

impl<'a> ResolutionEngine<'a> {
    /// Construct a resolution engine bound to a Metadata Index.
    pub fn new(store: &'a MetadataStore, max_depth: u32) -> Self {
        Self { store, max_depth }
    }

    /// Resolve `id` to its truth: the unique active descendant reached by
    /// walking supersession edges.
    pub fn resolve(&self, id: &str) -> Result<Truth, StorageError> {
        match self.store.resolve_to_truth(id, self.max_depth)? {
            Resolution::Active(truth_id) if truth_id == id => Ok(Truth::SelfActive(truth_id)),
            Resolution::Active(truth_id) => Ok(Truth::Resolved(truth_id)),
            Resolution::NoActiveTruth { deepest_id, truncated } => {
                Ok(Truth::NoActiveTruth { deepest_id, truncated })
            }
            Resolution::CycleDetected => Ok(Truth::CycleDetected),
        }
    }

    /// Validate that the caller's declared supersession set matches what was
    /// actually detected as conflicting.
    ///
    /// `valid` iff `proposed ⊆ detected`; `abort` if `proposed` is empty while
    /// `detected` is not; `invalid_subset` otherwise.
    pub fn validate_intent(
        proposed: &std::collections::HashSet<String>,
        detected: &std::collections::HashSet<String>,
    ) -> IntentValidation {
        if proposed.is_empty() && !detected.is_empty() {
            return IntentValidation::Abort;
        }
        if proposed.is_subset(detected) {
            IntentValidation::Valid
        } else {
            IntentValidation::InvalidSubset
        }
    }

    /// I3, enforced a second time at walk time as defense in depth: refuse a
    /// supersession whose new authority cannot outrank the old one.
    pub fn authority_allows_supersede(new_authority: Authority, old_authority: Authority) -> bool {
        new_authority.rank() >= old_authority.rank()
    }
}
