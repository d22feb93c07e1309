//! Embedding provider abstraction.
//!
//! Providers are stateless functions from text to a fixed-dimension
//! vector: the same text embedded at indexing time and at query time
//! must land close enough under cosine similarity to retrieve the same
//! chunk. A failing provider surfaces `EmbeddingUnavailable` — it never
//! degrades to zero vectors, which would silently corrupt ranking.

pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::ProviderSettings;
use crate::core::errors::Result;

pub use ollama::OllamaEmbedding;

/// Build the embedding provider from configuration. Embeddings always
/// come from the local Ollama server; completion backends vary, the
/// index's vector space must not.
pub fn build_provider(settings: &ProviderSettings) -> Arc<dyn EmbeddingProvider> {
    Arc::new(OllamaEmbedding::new(
        settings.ollama_base_url.clone(),
        settings.ollama_embedding_model.clone(),
        Duration::from_secs(settings.timeout_secs),
    ))
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; same order as the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
