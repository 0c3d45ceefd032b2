//! Lifecycle Engine
//!
//! Monotonically promotes records `pattern -> emergent -> canonical` based on
//! evidence count and age since last reinforcement, and decays vitality
//! linearly with time since the last linked evidence. Superseded/deprecated
//! records are excluded: callers only feed active records through
//! [`LifecycleEngine::transition`].
//!
//! The open question in the design notes ("is `deprecated` reachable by API
//! or only by background demotion") is resolved by keeping a single code
//! path parameterized by [`TransitionMode`] rather than two call sites that
//! could drift apart.

use chrono::{DateTime, Utc};

use crate::record::{Phase, Record, EVIDENCE_FLOOR};

/// Evidence count at/above which a `pattern` record promotes to `emergent`.
pub const EMERGENT_EVIDENCE_THRESHOLD: usize = 3;

/// Evidence count at/above which an `emergent` record promotes to `canonical`.
pub const CANONICAL_EVIDENCE_THRESHOLD: usize = 8;

/// Minimum age, in days, since creation before `canonical` promotion is
/// considered, so a single evidence burst cannot mint canonical knowledge
/// overnight.
pub const CANONICAL_MIN_AGE_DAYS: i64 = 7;

/// Vitality lost per day without new evidence.
const VITALITY_DECAY_PER_DAY: f32 = 0.05;

/// Vitality gained when evidence is freshly linked.
const VITALITY_BOOST_ON_EVIDENCE: f32 = 0.3;

/// Which path triggered a lifecycle transition; both run the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Triggered synchronously by a Memory API call (`link_evidence`).
    ApiRequested,
    /// Triggered by a background sweep with no specific caller.
    BackgroundDemotion,
}

/// Promotes phase and adjusts vitality for a single record, in place.
pub struct LifecycleEngine;

impl LifecycleEngine {
    /// Apply decay for the time elapsed since `record.updated_at`, without
    /// any new evidence. Vitality never drops below [`EVIDENCE_FLOOR`] once
    /// the record has any linked evidence.
    pub fn decay(record: &mut Record, now: DateTime<Utc>) {
        let elapsed_days = (now - record.updated_at).num_seconds().max(0) as f32 / 86_400.0;
        let decayed = record.vitality - elapsed_days * VITALITY_DECAY_PER_DAY;
        record.vitality = decayed.max(record.vitality_floor()).clamp(0.0, 1.0);
    }

    /// Record a fresh piece of linked evidence: boosts vitality and may
    /// promote `phase`, then runs the same transition logic regardless of
    /// `mode` (API-triggered or a background sweep).
    pub fn reinforce(record: &mut Record, evidence_count: usize, now: DateTime<Utc>, mode: TransitionMode) {
        record.vitality = (record.vitality + VITALITY_BOOST_ON_EVIDENCE)
            .max(EVIDENCE_FLOOR)
            .min(1.0);
        record.updated_at = now;
        Self::transition(record, evidence_count, now, mode);
    }

    /// Promote `phase` monotonically based on evidence count and age.
    /// Superseded/deprecated records are left untouched regardless of
    /// `mode`: the lifecycle only ever governs live knowledge.
    pub fn transition(record: &mut Record, evidence_count: usize, now: DateTime<Utc>, _mode: TransitionMode) {
        if !matches!(record.status, crate::record::Status::Active) {
            return;
        }

        let age_days = (now - record.created_at).num_seconds().max(0) / 86_400;

        match record.phase {
            Phase::Pattern if evidence_count >= EMERGENT_EVIDENCE_THRESHOLD => {
                record.phase = Phase::Emergent;
            }
            Phase::Emergent
                if evidence_count >= CANONICAL_EVIDENCE_THRESHOLD && age_days >= CANONICAL_MIN_AGE_DAYS =>
            {
                record.phase = Phase::Canonical;
            }
            _ => {}
        }
    }
}
