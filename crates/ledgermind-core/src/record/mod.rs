//! Record — the fundamental unit of the store
//!
//! A [`Record`] is a persisted decision, proposal, or intervention: it carries
//! identity, authorship, lifecycle state, and the supersession/evidence edges
//! that let the Resolution Engine and Ranking Engine do their work.

mod event;
mod target;

pub use event::Event;
pub use target::{normalize, TargetRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a record represents.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// An accepted, binding strategic decision.
    Decision,
    /// A candidate decision awaiting review.
    Proposal,
    /// A one-off corrective action, not itself superseded-over.
    Intervention,
}

impl Kind {
    /// Minimum rationale length (in `char`s) this kind requires on `record`.
    /// Superseding writes additionally require 15 regardless of kind.
    pub fn min_rationale_len(&self) -> usize {
        10
    }

    /// String form used in commit messages and record bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Decision => "decision",
            Kind::Proposal => "proposal",
            Kind::Intervention => "intervention",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a record.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The live, authoritative record for its target.
    Active,
    /// Replaced by a newer record via a supersession edge.
    Superseded,
    /// Retired without a direct replacement.
    Deprecated,
    /// Awaiting acceptance; not yet authoritative.
    Proposal,
}

impl Status {
    /// Term used by the Ranking Engine's `STATUS_BONUS` table.
    pub fn status_bonus(&self) -> f32 {
        match self {
            Status::Active => 1.0,
            Status::Superseded => -0.5,
            Status::Deprecated => -0.8,
            Status::Proposal => -0.2,
        }
    }

    /// String form used in commit messages and record bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Superseded => "superseded",
            Status::Deprecated => "deprecated",
            Status::Proposal => "proposal",
        }
    }

    /// Parse from the on-disk string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Status::Active),
            "superseded" => Some(Status::Superseded),
            "deprecated" => Some(Status::Deprecated),
            "proposal" => Some(Status::Proposal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance class. Controls who may supersede whom (I3) under the total
/// order `human > admin > agent`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    /// Authored or approved directly by a human operator.
    Human,
    /// Authored by an administrative process acting with elevated trust.
    Admin,
    /// Authored autonomously by an agent.
    Agent,
}

impl Authority {
    /// Position in the `human > admin > agent` total order; higher ranks
    /// outrank lower ones.
    pub fn rank(&self) -> u8 {
        match self {
            Authority::Human => 2,
            Authority::Admin => 1,
            Authority::Agent => 0,
        }
    }

    /// The Ranking Engine's `AUTHORITY_BONUS` contribution.
    pub fn authority_bonus(&self) -> f32 {
        match self {
            Authority::Human => 0.3,
            Authority::Admin => 0.15,
            Authority::Agent => 0.0,
        }
    }

    /// String form used in commit messages (`h|a|admin`) and record bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Human => "human",
            Authority::Admin => "admin",
            Authority::Agent => "agent",
        }
    }

    /// Short form used in commit messages (`authority=h|a|admin`).
    pub fn as_commit_code(&self) -> &'static str {
        match self {
            Authority::Human => "h",
            Authority::Admin => "admin",
            Authority::Agent => "a",
        }
    }

    /// Parse from the on-disk string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Authority::Human),
            "admin" => Some(Authority::Admin),
            "agent" => Some(Authority::Agent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse lifecycle stage, monotonically promoted by the Lifecycle Engine.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Newly observed, low-vitality.
    Pattern,
    /// Reinforced by repeated evidence but not yet canonical.
    Emergent,
    /// Established, high-confidence knowledge.
    Canonical,
}

impl Phase {
    /// The Ranking Engine's `PHASE_BONUS` contribution.
    pub fn phase_bonus(&self) -> f32 {
        match self {
            Phase::Canonical => 0.2,
            Phase::Emergent => 0.05,
            Phase::Pattern => 0.0,
        }
    }

    /// String form used in commit messages and record bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pattern => "pattern",
            Phase::Emergent => "emergent",
            Phase::Canonical => "canonical",
        }
    }

    /// Parse from the on-disk string form.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pattern" => Some(Phase::Pattern),
            "emergent" => Some(Phase::Emergent),
            "canonical" => Some(Phase::Canonical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Floor below which vitality never decays once a record has any linked
/// evidence.
pub const EVIDENCE_FLOOR: f32 = 0.2;

/// A persisted decision, proposal, or intervention.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Opaque stable identifier (UUID v4), unique process-wide.
    pub id: String,
    /// What this record represents.
    pub kind: Kind,
    /// Short, non-empty summary.
    pub title: String,
    /// Normalized namespace key; see [`normalize`].
    pub target: String,
    /// Justification. At least 10 chars, 15 when superseding (I2).
    pub rationale: String,
    /// Ordered list of anticipated consequences, possibly empty.
    pub consequences: Vec<String>,
    /// Lifecycle status.
    pub status: Status,
    /// Provenance class.
    pub authority: Authority,
    /// Coarse lifecycle stage.
    pub phase: Phase,
    /// Freshness scalar in `[0.0, 1.0]`.
    pub vitality: f32,
    /// Creation time, UTC, monotonic within a target.
    pub created_at: DateTime<Utc>,
    /// Last-modified time, UTC, monotonic.
    pub updated_at: DateTime<Utc>,
    /// Ids of records this one directly supersedes.
    pub supersedes: Vec<String>,
    /// Ids of linked evidence events.
    pub evidence: Vec<String>,
}

impl Record {
    /// Construct a fresh record in the `pattern` phase with zero vitality,
    /// ready for the caller to set `status`/`supersedes` before persisting.
    pub fn new(
        kind: Kind,
        title: impl Into<String>,
        target: impl Into<String>,
        rationale: impl Into<String>,
        consequences: Vec<String>,
        authority: Authority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            target: normalize(&target.into()),
            rationale: rationale.into(),
            consequences,
            status: Status::Active,
            authority,
            phase: Phase::Pattern,
            vitality: 0.0,
            created_at: now,
            updated_at: now,
            supersedes: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// I2: rationale length floor, 15 chars when this record supersedes
    /// others, 10 otherwise.
    pub fn min_rationale_len(&self) -> usize {
        if self.supersedes.is_empty() {
            self.kind.min_rationale_len()
        } else {
            15
        }
    }

    /// Whether `rationale` currently satisfies I2 for this record's shape.
    pub fn rationale_len_ok(&self) -> bool {
        self.rationale.chars().count() >= self.min_rationale_len()
    }

    /// Vitality never decays below [`EVIDENCE_FLOOR`] once evidence exists.
    pub fn vitality_floor(&self) -> f32 {
        if self.evidence.is_empty() {
            0.0
        } else {
            EVIDENCE_FLOOR
        }
    }
}

/// Input for `record_decision`/`record_proposal`.
///
/// Uses `deny_unknown_fields` to prevent field injection from untrusted
/// callers at the serialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordInput {
    /// Short, non-empty summary.
    pub title: String,
    /// Namespace key; normalized on write.
    pub target: String,
    /// Justification, subject to I2.
    pub rationale: String,
    /// Ordered list of anticipated consequences.
    #[serde(default)]
    pub consequences: Vec<String>,
    /// Provenance class.
    pub authority: Authority,
}

/// Result object returned by `search_decisions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Record id.
    pub id: String,
    /// Record title.
    pub title: String,
    /// Record target.
    pub target: String,
    /// Record status.
    pub status: Status,
    /// Record rationale.
    pub rationale: String,
    /// Final blended score from the Ranking Engine.
    pub score: f32,
    /// Resolved truth id, when this candidate was replaced by resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truth_id: Option<String>,
    /// Id of the record that superseded this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Search ranking mode, applied as a filter before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Keep only `status = active` candidates.
    Strict,
    /// Keep all, then dedupe by target keeping the top-scored record.
    Balanced,
    /// Keep all, no dedup — for audit trails.
    Audit,
}
