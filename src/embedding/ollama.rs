use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::core::errors::{CoreError, Result};

/// Embeddings from a local Ollama server (`/api/embeddings`).
#[derive(Clone)]
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        // One deadline over send and body read; headers arriving on
        // time is not completion.
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| CoreError::EmbeddingUnavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(CoreError::EmbeddingUnavailable(format!(
                    "embedding request failed: {}",
                    response.status()
                )));
            }

            let payload: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| CoreError::EmbeddingUnavailable(e.to_string()))?;

            if payload.embedding.is_empty() {
                return Err(CoreError::EmbeddingUnavailable(
                    "provider returned an empty vector".to_string(),
                ));
            }

            Ok(payload.embedding)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CoreError::ProviderTimeout {
                provider: "ollama-embed".to_string(),
                seconds: self.timeout.as_secs(),
            })?
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embedding(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.request_embedding(text).await?);
        }
        Ok(vectors)
    }
}
