//! Remote HTTP embedding backend (`remote-embeddings` feature).
//!
//! Posts text to a configured hosted embedding endpoint and expects a JSON
//! body of the shape `{"embedding": [f32, ...]}` (batch: `{"embeddings": [[...], ...]}`).

use serde::Deserialize;

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Deserialize)]
struct SingleResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by a blocking HTTP POST to a hosted API.
pub struct RemoteEmbedder {
    endpoint: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl RemoteEmbedder {
    /// Construct a provider against `endpoint`, expecting `dimensions`-length
    /// vectors back.
    pub fn new(endpoint: impl Into<String>, dimensions: usize) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| EmbeddingError::Init(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            dimensions,
            client,
        })
    }
}

impl EmbeddingProvider for RemoteEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text is empty".into()));
        }
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .json::<SingleResponse>()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        if response.embedding.len() != self.dimensions {
            return Err(EmbeddingError::Failed(format!(
                "remote returned {} dims, expected {}",
                response.embedding.len(),
                self.dimensions
            )));
        }
        Ok(response.embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "texts": texts }))
            .send()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .json::<BatchResponse>()
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        "remote-http"
    }
}
