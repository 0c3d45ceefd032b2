//! Local ONNX embedding backend (`embeddings` feature).
//!
//! Grounded on vestige-core's `embeddings::local` module: a process-wide
//! lazily-initialized model behind a mutex, matryoshka-truncated to the
//! store's configured dimensionality.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{EmbeddingError, EmbeddingProvider};

/// Maximum text length handed to the model; longer input is truncated.
const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size used internally by `embed_batch`.
const BATCH_SIZE: usize = 32;

static MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("LEDGERMIND_EMBEDDING_CACHE") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "ledgermind", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".ledgermind_embedding_cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = MODEL.get_or_init(|| {
        let dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("failed to create embedding cache dir {:?}: {e}", dir);
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(dir);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize nomic-embed-text-v1.5: {e}"))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::Init(format!("embedding model lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::Init(err.clone())),
    }
}

fn truncate_and_normalize(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    if vector.len() > dimensions {
        vector.truncate(dimensions);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Local ONNX-backed embedding provider using nomic-embed-text-v1.5,
/// matryoshka-truncated to `dimensions`.
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    /// Construct a provider truncating the model's native 768-dim output to
    /// `dimensions`.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Eagerly load the model rather than waiting for the first `embed`
    /// call; useful so startup surfaces model-download failures promptly.
    pub fn warm_up(&self) -> Result<(), EmbeddingError> {
        model().map(|_| ())
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".into()));
        }
        let mut model = model()?;
        let text = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
        let vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Failed("no embedding returned".into()))?;
        Ok(truncate_and_normalize(vector, self.dimensions))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = model()?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk
                .iter()
                .map(|t| if t.len() > MAX_TEXT_LENGTH { &t[..MAX_TEXT_LENGTH] } else { *t })
                .collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
            for vector in embeddings {
                out.push(truncate_and_normalize(vector, self.dimensions));
            }
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "local-nomic-embed-text-v1.5"
    }
}
