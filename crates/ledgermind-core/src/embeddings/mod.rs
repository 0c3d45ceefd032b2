//! Embedding Providers
//!
//! The Ranking Engine and Vector Index work against any [`EmbeddingProvider`]
//! implementation, injected at [`crate::MemoryStore::open`] time. Three
//! variants ship: a local ONNX model, a remote HTTP endpoint, and a
//! deterministic mock for tests and embedding-free deployments.

#[cfg(feature = "embeddings")]
mod local;
mod mock;
#[cfg(feature = "remote-embeddings")]
mod remote;

#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;
pub use mock::MockEmbedder;
#[cfg(feature = "remote-embeddings")]
pub use remote::RemoteEmbedder;

/// Embedding provider error.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// The backend failed to initialize (model load, connection setup).
    #[error("embedding backend initialization failed: {0}")]
    Init(String),
    /// Embedding generation failed for the given input.
    #[error("embedding generation failed: {0}")]
    Failed(String),
    /// The input was rejected before being sent to the backend.
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),
}

/// Converts text into a fixed-dimension vector for the Vector Index.
///
/// Implementations must be deterministic for identical input and must
/// always return vectors of [`EmbeddingProvider::dimensions`] length.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts. The default implementation calls
    /// [`EmbeddingProvider::embed`] once per item; backends that support
    /// batched inference should override this for efficiency.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// The fixed dimensionality of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// A short identifier for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` on
/// dimension mismatch or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}
