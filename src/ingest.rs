//! Document ingestion.
//!
//! `ingest` turns raw document text into embedded chunks in the vector
//! index. A document's chunk set is fully replaced on re-ingestion;
//! nothing stale survives. `revoke_document` removes every chunk when
//! the admin workflow rejects or deletes a document.

use std::sync::Arc;
use std::time::Duration;

use crate::chunker;
use crate::core::config::ChunkingSettings;
use crate::core::errors::{CoreError, Result};
use crate::core::retry;
use crate::embedding::EmbeddingProvider;
use crate::index::{ChunkRecord, VectorIndex};
use crate::scope::AccessScope;

pub struct IngestService {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunking: ChunkingSettings,
}

impl IngestService {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            chunking,
        }
    }

    /// Chunk, embed and index a document. Returns the new chunk count.
    ///
    /// Whitespace-only text is not an error: it clears the document's
    /// chunk set and indexes nothing.
    pub async fn ingest(
        &self,
        document_id: &str,
        display_name: &str,
        raw_text: &str,
        scope: AccessScope,
    ) -> Result<usize> {
        if document_id.trim().is_empty() {
            return Err(CoreError::Validation("document_id must not be empty".into()));
        }

        let normalized = chunker::normalize(raw_text);
        let spans = chunker::chunk(
            &normalized,
            self.chunking.max_chunk_size,
            self.chunking.overlap,
        );

        if spans.is_empty() {
            let removed = self.index.delete_by_document(document_id).await?;
            tracing::info!(
                "ingest {}: empty after normalization, cleared {} chunks",
                document_id,
                removed
            );
            return Ok(0);
        }

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let embeddings = retry::retry_transient_once(Duration::from_millis(200), || {
            self.embedder.embed_batch(&texts)
        })
        .await
        .map_err(retry::exhausted)?;

        if embeddings.len() != spans.len() {
            return Err(CoreError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} chunks",
                embeddings.len(),
                spans.len()
            )));
        }

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let items: Vec<(ChunkRecord, Vec<f32>)> = spans
            .into_iter()
            .zip(embeddings)
            .map(|(span, embedding)| {
                (
                    ChunkRecord {
                        chunk_id: format!("{}#{:04}", document_id, span.ordinal),
                        document_id: document_id.to_string(),
                        document_name: display_name.to_string(),
                        ordinal: span.ordinal as i64,
                        text: span.text,
                        start_offset: span.start as i64,
                        scope: scope.clone(),
                        ingested_at: ingested_at.clone(),
                    },
                    embedding,
                )
            })
            .collect();

        // Replace, never merge: drop the old chunk set before inserting.
        self.index.delete_by_document(document_id).await?;
        let count = items.len();
        self.index.upsert_batch(items).await?;

        tracing::info!("ingest {}: indexed {} chunks ({})", document_id, count, scope);
        Ok(count)
    }

    /// Remove all of a document's chunks from the index.
    pub async fn revoke_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.index.delete_by_document(document_id).await?;
        tracing::info!("revoked {}: removed {} chunks", document_id, removed);
        Ok(removed)
    }
}
