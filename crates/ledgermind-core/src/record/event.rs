//! Event — ephemeral episodic record linked as evidence
//!
//! Events are append-only; the Episodic Store exposes them through the
//! Metadata Index's own connection but in distinct tables/namespaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An episodic event, optionally linked to one or more targets as evidence.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Opaque stable identifier (UUID v4).
    pub id: String,
    /// The prompt or input that produced this event.
    pub prompt: String,
    /// The response or outcome observed.
    pub response: String,
    /// Whether the event represents a successful outcome.
    pub success: bool,
    /// Free-form key/value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Targets this event is linked to as evidence.
    #[serde(default)]
    pub linked_targets: Vec<String>,
    /// Creation time, UTC.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Construct a new event with the current time.
    pub fn new(prompt: impl Into<String>, response: impl Into<String>, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            response: response.into(),
            success,
            metadata: HashMap::new(),
            linked_targets: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
