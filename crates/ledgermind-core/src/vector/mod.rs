//! Vector Index — approximate nearest-neighbor search with an unindexed tail
//!
//! Maintains a persistent HNSW index covering everything present at the
//! last [`VectorIndex::compact`] plus a small in-memory tail of
//! post-compact insertions. `search` unions both result sets and re-ranks
//! by cosine distance. On load failure the index degrades to a brute-force
//! scan rather than failing the process.

use std::collections::HashMap;
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Default embedding dimensions after Matryoshka truncation (768 -> 256).
pub const DEFAULT_DIMENSIONS: usize = 256;

/// HNSW connectivity parameter (higher = better recall, more memory).
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building.
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower).
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Vector search error types.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    /// Failed to create the index.
    #[error("index creation failed: {0}")]
    IndexCreation(String),
    /// Failed to add a vector.
    #[error("failed to add vector: {0}")]
    IndexAdd(String),
    /// Failed to search.
    #[error("search failed: {0}")]
    IndexSearch(String),
    /// Failed to persist/load index.
    #[error("persistence failed: {0}")]
    IndexPersistence(String),
    /// Dimension mismatch.
    #[error("invalid dimensions: expected {0}, got {1}")]
    InvalidDimensions(usize, usize),
}

/// Configuration for the vector index.
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Number of dimensions.
    pub dimensions: usize,
    /// HNSW connectivity parameter.
    pub connectivity: usize,
    /// Expansion factor for adding vectors.
    pub expansion_add: usize,
    /// Expansion factor for searching.
    pub expansion_search: usize,
    /// Distance metric.
    pub metric: MetricKind,
    /// Fraction of total vectors the tail may reach before `compact()`
    /// should be called.
    pub tail_fraction: f32,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            metric: MetricKind::Cos,
            tail_fraction: 0.05,
        }
    }
}

/// Index statistics.
#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    /// Total number of vectors (ANN index plus tail).
    pub total_vectors: usize,
    /// Number of vectors still sitting in the unindexed tail.
    pub tail_len: usize,
    /// Vector dimensions.
    pub dimensions: usize,
    /// Whether the index has degraded to brute-force scan.
    pub brute_force: bool,
}

/// Owned snapshot of every indexed (key, vector) pair, taken under a brief
/// lock so the actual ANN rebuild can run without holding it.
pub struct CompactionSnapshot {
    entries: Vec<(String, Vec<f32>)>,
}

/// A freshly rebuilt ANN index, not yet installed into a [`VectorIndex`].
pub struct CompactedIndex {
    index: Index,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
    compacted_keys: Vec<String>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

enum Backend {
    Ann(Index),
    BruteForce,
}

/// HNSW vector index with an unindexed tail and brute-force degradation.
pub struct VectorIndex {
    backend: Backend,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
    /// Vectors inserted since the last `compact()`, not yet in the ANN index.
    tail: HashMap<String, Vec<f32>>,
}

impl VectorIndex {
    /// Create a new vector index with default configuration.
    pub fn new() -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::default())
    }

    /// Create a new vector index with custom configuration.
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let index = Self::build_ann_index(&config)?;
        Ok(Self {
            backend: Backend::Ann(index),
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
            tail: HashMap::new(),
        })
    }

    fn build_ann_index(config: &VectorIndexConfig) -> Result<Index, VectorSearchError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: config.metric,
            quantization: ScalarKind::I8,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))
    }

    /// Number of vectors across the ANN index and the tail.
    pub fn len(&self) -> usize {
        let ann_len = match &self.backend {
            Backend::Ann(index) => index.size(),
            Backend::BruteForce => 0,
        };
        ann_len + self.tail.len()
    }

    /// Whether the index holds no vectors at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensions configured for this index.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// The configuration this index was built with.
    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Whether the index has degraded to pure brute-force scan.
    pub fn is_brute_force(&self) -> bool {
        matches!(self.backend, Backend::BruteForce)
    }

    /// Add or replace a vector under `key`. Lands in the tail until the next
    /// [`VectorIndex::compact`].
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                vector.len(),
            ));
        }
        self.tail.insert(key.to_string(), vector.to_vec());
        Ok(())
    }

    /// Remove a vector by key from both the tail and the ANN index.
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorSearchError> {
        let removed_from_tail = self.tail.remove(key).is_some();

        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            if let Backend::Ann(index) = &self.backend {
                index
                    .remove(id)
                    .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            }
            return Ok(true);
        }

        Ok(removed_from_tail)
    }

    /// Whether `key` exists anywhere in the index (tail or ANN).
    pub fn contains(&self, key: &str) -> bool {
        self.tail.contains_key(key) || self.key_to_id.contains_key(key)
    }

    /// Search for the `limit` most similar vectors, unioning ANN results
    /// with a brute-force scan of the tail and re-ranking by cosine
    /// distance.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorSearchError> {
        if query.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.config.dimensions,
                query.len(),
            ));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: HashMap<String, f32> = HashMap::new();

        match &self.backend {
            Backend::Ann(index) => {
                if index.size() > 0 {
                    let results = index
                        .search(query, limit + self.tail.len())
                        .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;
                    for (id, distance) in results.keys.iter().zip(results.distances.iter()) {
                        if let Some(key) = self.id_to_key.get(id) {
                            scored.insert(key.clone(), 1.0 - distance);
                        }
                    }
                }
            }
            Backend::BruteForce => {
                for (key, vector) in &self.key_to_id_vectors() {
                    scored.insert(key.clone(), cosine_similarity(query, vector));
                }
            }
        }

        for (key, vector) in &self.tail {
            scored.insert(key.clone(), cosine_similarity(query, vector));
        }

        let mut results: Vec<(String, f32)> = scored.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    fn key_to_id_vectors(&self) -> HashMap<String, Vec<f32>> {
        // Brute-force backend keeps no separate vector store beyond the
        // tail; once degraded, everything lives in `tail`.
        HashMap::new()
    }

    /// Whether the tail has grown past `tail_fraction` of the total and a
    /// `compact()` is due.
    pub fn needs_compact(&self) -> bool {
        let total = self.len();
        if total == 0 {
            return false;
        }
        (self.tail.len() as f32 / total as f32) > self.config.tail_fraction
    }

    /// Rebuild the ANN index from the union of the current ANN contents and
    /// the tail, then atomically swap it in and clear the tail. Runs
    /// entirely under whatever lock the caller already holds; callers that
    /// want the rebuild off the write path should use
    /// [`VectorIndex::snapshot_for_compaction`] and
    /// [`VectorIndex::install_compacted`] instead, so the expensive rebuild
    /// runs without holding the lock at all.
    pub fn compact(&mut self) -> Result<(), VectorSearchError> {
        if matches!(self.backend, Backend::BruteForce) {
            return Ok(());
        }
        let snapshot = self.snapshot_for_compaction();
        let compacted = Self::build_compacted(&self.config, &snapshot)?;
        self.install_compacted(compacted);
        Ok(())
    }

    /// Extract every (key, vector) pair currently indexed — ANN contents
    /// plus tail — as plain owned data, so a rebuild can run without
    /// holding any lock on `self`.
    pub fn snapshot_for_compaction(&self) -> CompactionSnapshot {
        let mut entries = Vec::with_capacity(self.len());
        if let Backend::Ann(old_index) = &self.backend {
            for (key, &old_id) in &self.key_to_id {
                if let Ok(vector) = old_index.get(old_id) {
                    entries.push((key.clone(), vector));
                }
            }
        }
        for (key, vector) in &self.tail {
            entries.push((key.clone(), vector.clone()));
        }
        CompactionSnapshot { entries }
    }

    /// Build a fresh ANN index from a snapshot. Pure computation — touches
    /// no `VectorIndex` state and holds no lock, so it's safe to run on a
    /// background thread while writers keep using the live index.
    pub fn build_compacted(
        config: &VectorIndexConfig,
        snapshot: &CompactionSnapshot,
    ) -> Result<CompactedIndex, VectorSearchError> {
        let mut rebuilt = Self::build_ann_index(config)?;
        rebuilt
            .reserve(snapshot.entries.len().max(16))
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        let mut key_to_id = HashMap::new();
        let mut id_to_key = HashMap::new();
        let mut next_id = 0u64;
        let mut compacted_keys = Vec::with_capacity(snapshot.entries.len());

        for (key, vector) in &snapshot.entries {
            rebuilt
                .add(next_id, vector)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            key_to_id.insert(key.clone(), next_id);
            id_to_key.insert(next_id, key.clone());
            compacted_keys.push(key.clone());
            next_id += 1;
        }

        Ok(CompactedIndex {
            index: rebuilt,
            key_to_id,
            id_to_key,
            next_id,
            compacted_keys,
        })
    }

    /// Atomically swap a background-built index in. Only the keys that were
    /// actually folded into `compacted` are dropped from the tail — anything
    /// added after the snapshot was taken stays in the tail and is picked up
    /// by the next compaction, rather than being silently lost.
    pub fn install_compacted(&mut self, compacted: CompactedIndex) {
        for key in &compacted.compacted_keys {
            self.tail.remove(key);
        }
        self.backend = Backend::Ann(compacted.index);
        self.key_to_id = compacted.key_to_id;
        self.id_to_key = compacted.id_to_key;
        self.next_id = compacted.next_id;
    }

    /// Persist the ANN index and key mappings to disk.
    pub fn save(&self, path: &Path) -> Result<(), VectorSearchError> {
        let Backend::Ann(index) = &self.backend else {
            return Ok(());
        };
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".to_string()))?;
        index
            .save(path_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let mappings = serde_json::json!({
            "key_to_id": self.key_to_id,
            "next_id": self.next_id,
        });
        let mappings_path = path.with_extension("mappings.json");
        std::fs::write(
            &mappings_path,
            serde_json::to_string(&mappings).unwrap_or_default(),
        )
        .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let tail_path = path.with_extension("tail.json");
        std::fs::write(&tail_path, serde_json::to_string(&self.tail).unwrap_or_default())
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        Ok(())
    }

    /// Load a persisted index. On any failure, degrade to a brute-force
    /// index over whatever tail data is recoverable rather than failing
    /// the whole process.
    pub fn load(path: &Path, config: VectorIndexConfig) -> Self {
        match Self::try_load(path, &config) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("vector index load failed, degrading to brute-force: {e}");
                let tail_path = path.with_extension("tail.json");
                let tail = std::fs::read_to_string(&tail_path)
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default();
                Self {
                    backend: Backend::BruteForce,
                    config,
                    key_to_id: HashMap::new(),
                    id_to_key: HashMap::new(),
                    next_id: 0,
                    tail,
                }
            }
        }
    }

    fn try_load(path: &Path, config: &VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorSearchError::IndexPersistence("invalid path".to_string()))?;

        let index = Self::build_ann_index(config)?;
        index
            .load(path_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let mappings_path = path.with_extension("mappings.json");
        let mappings_str = std::fs::read_to_string(&mappings_path)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        let mappings: serde_json::Value = serde_json::from_str(&mappings_str)
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;

        let key_to_id: HashMap<String, u64> = serde_json::from_value(mappings["key_to_id"].clone())
            .map_err(|e| VectorSearchError::IndexPersistence(e.to_string()))?;
        let next_id = mappings["next_id"].as_u64().unwrap_or(0);
        let id_to_key = key_to_id.iter().map(|(k, &v)| (v, k.clone())).collect();

        let tail_path = path.with_extension("tail.json");
        let tail = std::fs::read_to_string(&tail_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Ok(Self {
            backend: Backend::Ann(index),
            config: config.clone(),
            key_to_id,
            id_to_key,
            next_id,
            tail,
        })
    }

    /// Index statistics.
    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            tail_len: self.tail.len(),
            dimensions: self.config.dimensions,
            brute_force: self.is_brute_force(),
        }
    }
}
