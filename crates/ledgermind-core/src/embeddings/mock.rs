//! Deterministic mock embedding backend.
//!
//! Used by tests and by deployments that only need the Metadata Index / Audit
//! Log behavior without a real embedding model. Vectors are a hash of the
//! input text, so identical text always embeds identically and unrelated
//! text is (with overwhelming likelihood) dissimilar.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{EmbeddingError, EmbeddingProvider};

/// Deterministic, model-free embedding provider for tests.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    /// Construct a mock provider returning `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".into()));
        }

        let mut vector = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            vector.push((bits % 2000) as f32 / 1000.0 - 1.0);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "mock-hash"
    }
}
