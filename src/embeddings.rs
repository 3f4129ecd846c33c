use async_trait::async_trait;
use ollama_rs::{
    generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest},
    Ollama,
};
use tracing::debug;

use crate::error::RetrievalError;

/// Turns texts into dense vectors for the vector store.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

/// Embeds texts with a model served by Ollama (`nomic-embed-text` by default).
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(host: &str, port: u16, model: &str) -> Self {
        Self {
            client: Ollama::new(host.to_string(), port),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        debug!(count = expected, model = %self.model, "embedding texts");

        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if response.embeddings.len() != expected {
            return Err(RetrievalError::Embedding(format!(
                "expected {expected} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}
