//! Target normalization and the alias registry
//!
//! Normalization is deterministic and idempotent (I7,
//! `normalize(normalize(x)) == normalize(x)`). The registry is owned by the
//! Memory API with an explicit lifecycle rather than reached across modules
//! as a process-wide singleton.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Lowercase, trim, and collapse internal whitespace runs to a single `-`.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for c in lowered.chars() {
        if c.is_whitespace() || c == '_' {
            if !last_was_sep && !out.is_empty() {
                out.push('-');
                last_was_sep = true;
            }
        } else {
            out.push(c);
            last_was_sep = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Persisted bimap from human-entered alias strings to canonical target
/// keys, loaded on open and flushed on write.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    alias_to_canonical: HashMap<String, String>,
    path: Option<PathBuf>,
}

impl TargetRegistry {
    /// Construct an in-memory registry with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an existing registry from `targets.json`, or start empty if the
    /// file does not yet exist.
    pub fn load_on_open(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(Self {
                alias_to_canonical: HashMap::new(),
                path: Some(path.to_path_buf()),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let alias_to_canonical: HashMap<String, String> =
            serde_json::from_str(&raw).unwrap_or_default();
        Ok(Self {
            alias_to_canonical,
            path: Some(path.to_path_buf()),
        })
    }

    /// Register `alias` as resolving to `canonical` (itself normalized), and
    /// persist the change if this registry was loaded from a file.
    pub fn persist_on_write(&mut self, alias: &str, canonical: &str) -> std::io::Result<()> {
        let key = alias.trim().to_lowercase();
        let value = normalize(canonical);
        self.alias_to_canonical.insert(key, value);
        self.flush()
    }

    /// Resolve a human-entered string to its canonical target key, falling
    /// back to `normalize(input)` when no alias is registered.
    pub fn resolve(&self, input: &str) -> String {
        let key = input.trim().to_lowercase();
        self.alias_to_canonical
            .get(&key)
            .cloned()
            .unwrap_or_else(|| normalize(input))
    }

    /// Flush the registry to disk, if it has a backing path.
    pub fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(&self.alias_to_canonical)
            .unwrap_or_else(|_| "{}".to_string());
        std::fs::write(path, serialized)
    }

    /// Release any in-memory state; the caller drops the registry afterward.
    pub fn close_on_shutdown(&mut self) {
        self.alias_to_canonical.clear();
    }
}
