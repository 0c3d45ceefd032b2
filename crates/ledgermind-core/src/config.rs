//! Runtime configuration
//!
//! All keys are optional; [`Config::default`] matches the documented defaults.
//! Unrecognized keys passed to [`Config::from_map`] are ignored for forward
//! compatibility; an unparseable value for a recognized key is an error.

use std::collections::HashMap;

/// Tunable parameters for the memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Minimum wall-clock interval (seconds) between proposal creation and
    /// acceptance. Enforces I5.
    pub review_window_seconds: i64,
    /// Minimum number of linked evidence events required to accept a
    /// proposal. Enforces I6.
    pub min_evidence: usize,
    /// Depth at which a supersession walk gives up and reports
    /// `NoActiveTruth` with `truncated = true`.
    pub max_resolution_depth: u32,
    /// Relevance filter applied to `search_decisions` before ranking.
    pub relevance_threshold: f32,
    /// Episodic context window, in turns, retained by the event store.
    pub retention_turns: usize,
    /// Minimum interval between consecutive writes from the same authority.
    pub cooldown_seconds: u64,
    /// Fraction of total vectors the unindexed tail may reach before
    /// `compact()` rebuilds the ANN index.
    pub ann_tail_fraction: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            review_window_seconds: 3600,
            min_evidence: 1,
            max_resolution_depth: 32,
            relevance_threshold: 0.7,
            retention_turns: 10,
            cooldown_seconds: 2,
            ann_tail_fraction: 0.05,
        }
    }
}

/// Error produced when a recognized configuration key cannot be parsed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid value for config key {key:?}: {value:?}")]
pub struct ConfigError {
    key: String,
    value: String,
}

impl Config {
    /// Build a [`Config`] from a string map, starting from defaults and
    /// overriding recognized keys. Unrecognized keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        macro_rules! parse_into {
            ($key:literal, $field:ident) => {
                if let Some(raw) = map.get($key) {
                    config.$field = raw.parse().map_err(|_| ConfigError {
                        key: $key.to_string(),
                        value: raw.clone(),
                    })?;
                }
            };
        }

        parse_into!("review_window_seconds", review_window_seconds);
        parse_into!("min_evidence", min_evidence);
        parse_into!("max_resolution_depth", max_resolution_depth);
        parse_into!("relevance_threshold", relevance_threshold);
        parse_into!("retention_turns", retention_turns);
        parse_into!("cooldown_seconds", cooldown_seconds);
        parse_into!("ann_tail_fraction", ann_tail_fraction);

        Ok(config)
    }
}
